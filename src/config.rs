use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// Argon2 work factor. The defaults match OWASP's argon2id baseline, roughly
/// the cost of bcrypt at 12 rounds.
#[derive(Debug, Clone, Deserialize)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub hashing: HashConfig,
    pub cors_origins: Vec<String>,
    pub login_rate_limit_max: usize,
    /// Behind a reverse proxy that appends `X-Forwarded-For`.
    pub trust_proxy: bool,
    /// Frontend base URL used in verification and reset links.
    pub client_url: String,
    pub production: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "marhba-bik".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "marhba-bik-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("MINIO_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".into()),
            bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "marhba-bik".into()),
            access_key: std::env::var("MINIO_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".into()),
            secret_key: std::env::var("MINIO_SECRET_KEY").unwrap_or_else(|_| "minioadmin".into()),
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };
        let defaults = HashConfig::default();
        let hashing = HashConfig {
            memory_kib: env_parse("ARGON2_MEMORY_KIB", defaults.memory_kib),
            iterations: env_parse("ARGON2_ITERATIONS", defaults.iterations),
        };
        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_default();
        let production = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            jwt,
            storage,
            hashing,
            cors_origins,
            login_rate_limit_max: env_parse("LOGIN_RATE_LIMIT_MAX", 5),
            trust_proxy: env_parse("TRUST_PROXY", false),
            client_url: std::env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:5173".into()),
            production,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_and_trimmed() {
        let origins = parse_origins(" https://marhbabik.ma, http://localhost:5173 ,,");
        assert_eq!(origins, vec!["https://marhbabik.ma", "http://localhost:5173"]);
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("MARHBA_TEST_BAD_NUMBER", "twelve");
        assert_eq!(env_parse("MARHBA_TEST_BAD_NUMBER", 12u32), 12);
        assert_eq!(env_parse("MARHBA_TEST_MISSING_NUMBER", 7usize), 7);
    }
}
