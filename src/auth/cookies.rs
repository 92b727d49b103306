use axum::http::{header, HeaderMap, HeaderValue};

use super::jwt::TokenPair;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Finds a cookie value in the `Cookie` request header(s).
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .map(str::trim)
        .find_map(|c| {
            c.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('='))
                .filter(|v| !v.is_empty())
        })
}

/// Bearer header wins over the access cookie.
pub fn access_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| {
            auth.strip_prefix("Bearer ")
                .or_else(|| auth.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty());
    bearer.or_else(|| cookie_value(headers, ACCESS_COOKIE))
}

fn build(name: &str, value: &str, max_age_secs: u64, secure: bool) -> Option<HeaderValue> {
    let mut cookie = format!(
        "{name}={value}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

pub fn session_cookies(
    pair: &TokenPair,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
    secure: bool,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(v) = build(ACCESS_COOKIE, &pair.access_token, access_ttl_secs, secure) {
        headers.append(header::SET_COOKIE, v);
    }
    if let Some(v) = build(REFRESH_COOKIE, &pair.refresh_token, refresh_ttl_secs, secure) {
        headers.append(header::SET_COOKIE, v);
    }
    headers
}

pub fn clear_session_cookies(secure: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        if let Some(v) = build(name, "", 0, secure) {
            headers.append(header::SET_COOKIE, v);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        headers.insert(header::COOKIE, "accessToken=from-cookie".parse().unwrap());
        assert_eq!(access_token(&headers), Some("from-header"));
    }

    #[test]
    fn falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "theme=dark; accessToken=abc.def.ghi; refreshToken=r".parse().unwrap(),
        );
        assert_eq!(access_token(&headers), Some("abc.def.ghi"));
        assert_eq!(cookie_value(&headers, REFRESH_COOKIE), Some("r"));
        assert_eq!(cookie_value(&headers, "access"), None);
    }

    #[test]
    fn no_token_anywhere() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic Zm9vOmJhcg==".parse().unwrap());
        assert_eq!(access_token(&headers), None);
    }

    #[test]
    fn cleared_cookies_expire_immediately() {
        let headers = clear_session_cookies(true);
        let values: Vec<_> = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| v.contains("Max-Age=0") && v.contains("Secure")));
    }
}
