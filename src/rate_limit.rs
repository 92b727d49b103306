//! Process-local sliding-window limiter for sensitive routes.

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{
    auth::{cookies, jwt::JwtKeys},
    error::AppError,
};

pub struct RateLimiter {
    name: &'static str,
    max_attempts: usize,
    window: Duration,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, max_attempts: usize, window: Duration) -> Self {
        Self {
            name,
            max_attempts,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(&self, key: &str) -> Result<(), AppError> {
        self.check_at(key, Instant::now()).await
    }

    /// Drops hits older than the window, then admits the call if fewer than
    /// `max_attempts` remain.
    pub async fn check_at(&self, key: &str, now: Instant) -> Result<(), AppError> {
        let mut hits = self.hits.lock().await;
        let entry = hits.entry(key.to_string()).or_default();
        entry.retain(|t| now.saturating_duration_since(*t) <= self.window);
        if entry.len() >= self.max_attempts {
            warn!(limiter = self.name, %key, "rate limit exceeded");
            return Err(AppError::TooManyAttempts);
        }
        entry.push(now);
        Ok(())
    }
}

/// The limiters of the sensitive routes, built once per process.
pub struct RateLimits {
    pub login: Arc<RateLimiter>,
    pub forgot_password: Arc<RateLimiter>,
    pub change_password: Arc<RateLimiter>,
    pub delete_account: Arc<RateLimiter>,
}

impl RateLimits {
    pub fn new(login_max: usize) -> Self {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;
        Self {
            login: Arc::new(RateLimiter::new(
                "login",
                login_max,
                Duration::from_secs(15 * MINUTE),
            )),
            forgot_password: Arc::new(RateLimiter::new(
                "forgot_password",
                3,
                Duration::from_secs(HOUR),
            )),
            change_password: Arc::new(RateLimiter::new(
                "change_password",
                3,
                Duration::from_secs(HOUR),
            )),
            delete_account: Arc::new(RateLimiter::new(
                "delete_account",
                2,
                Duration::from_secs(24 * HOUR),
            )),
        }
    }
}

/// Middleware state: one limiter plus the keys used to recognise callers.
#[derive(Clone)]
pub struct RateGate {
    pub limiter: Arc<RateLimiter>,
    pub keys: JwtKeys,
    /// Read the client address from `X-Forwarded-For`. Only safe when a
    /// reverse proxy we run overwrites or appends that header.
    pub trust_proxy: bool,
}

impl RateGate {
    pub fn new(limiter: &Arc<RateLimiter>, keys: JwtKeys, trust_proxy: bool) -> Self {
        Self {
            limiter: limiter.clone(),
            keys,
            trust_proxy,
        }
    }
}

/// Right-most `X-Forwarded-For` entry: the hop our proxy appended. Entries
/// to its left are written by the client.
fn forwarded_client(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
        .last()
}

/// Authenticated subject when a valid access token is present, else the
/// caller's address.
pub fn caller_key(
    keys: &JwtKeys,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy: bool,
) -> String {
    if let Some(claims) = cookies::access_token(headers).and_then(|t| keys.verify_access(t).ok())
    {
        return format!("user:{}", claims.sub);
    }
    let forwarded = trust_proxy.then(|| forwarded_client(headers)).flatten();
    match (forwarded, peer) {
        (Some(ip), _) => format!("ip:{ip}"),
        (None, Some(addr)) => format!("ip:{}", addr.ip()),
        (None, None) => "ip:unknown".to_string(),
    }
}

pub async fn enforce(
    State(gate): State<RateGate>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = caller_key(&gate.keys, request.headers(), peer, gate.trust_proxy);
    gate.limiter.check(&key).await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use uuid::Uuid;

    #[tokio::test]
    async fn fourth_call_in_window_is_rejected_then_window_slides() {
        let limiter = RateLimiter::new("test", 3, Duration::from_secs(60));
        let t0 = Instant::now();
        limiter.check_at("ip:1.2.3.4", t0).await.unwrap();
        limiter.check_at("ip:1.2.3.4", t0 + Duration::from_secs(1)).await.unwrap();
        limiter.check_at("ip:1.2.3.4", t0 + Duration::from_secs(2)).await.unwrap();

        let err = limiter
            .check_at("ip:1.2.3.4", t0 + Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyAttempts));

        limiter
            .check_at("ip:1.2.3.4", t0 + Duration::from_secs(61))
            .await
            .expect("first hit left the window");
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new("test", 1, Duration::from_secs(60));
        let now = Instant::now();
        limiter.check_at("ip:a", now).await.unwrap();
        assert!(limiter.check_at("ip:a", now).await.is_err());
        limiter.check_at("ip:b", now).await.unwrap();
    }

    #[test]
    fn caller_key_prefers_identity_over_address() {
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "s".into(),
            issuer: "i".into(),
            audience: "a".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        });
        let peer: SocketAddr = "10.0.0.7:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(caller_key(&keys, &headers, Some(peer), false), "ip:10.0.0.7");
        assert_eq!(caller_key(&keys, &headers, None, false), "ip:unknown");

        let id = Uuid::new_v4();
        let token = keys.sign_access(id, 0).unwrap();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        assert_eq!(caller_key(&keys, &headers, Some(peer), false), format!("user:{id}"));
    }

    #[test]
    fn forwarded_header_is_ignored_without_a_trusted_proxy() {
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "s".into(),
            issuer: "i".into(),
            audience: "a".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        });
        let peer: SocketAddr = "10.0.0.7:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
        assert_eq!(caller_key(&keys, &headers, Some(peer), false), "ip:10.0.0.7");
        assert_eq!(caller_key(&keys, &headers, None, false), "ip:unknown");
    }

    #[test]
    fn trusted_proxy_hop_is_the_right_most_entry() {
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "s".into(),
            issuer: "i".into(),
            audience: "a".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        });
        let peer: SocketAddr = "10.0.0.1:443".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "1.1.1.1, not-an-ip, 198.51.100.4".parse().unwrap(),
        );
        assert_eq!(caller_key(&keys, &headers, Some(peer), true), "ip:198.51.100.4");

        headers.insert("x-forwarded-for", "garbage".parse().unwrap());
        assert_eq!(caller_key(&keys, &headers, Some(peer), true), "ip:10.0.0.1");
    }
}
