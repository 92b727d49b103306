//! One-time tokens for e-mail verification and password reset.
//!
//! Only the SHA-256 digest is persisted; the raw value leaves the process
//! once, through the notifier.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

pub const EMAIL_VERIFICATION_TTL: Duration = Duration::hours(24);
pub const PASSWORD_RESET_TTL: Duration = Duration::minutes(10);

#[derive(Debug, Clone)]
pub struct OneTimeToken {
    pub raw: String,
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

impl OneTimeToken {
    pub fn generate(now: OffsetDateTime, ttl: Duration) -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let raw = Base64UrlUnpadded::encode_string(&bytes);
        let hash = hash_token(&raw);
        Self {
            raw,
            hash,
            expires_at: now + ttl,
        }
    }
}

pub fn hash_token(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_hash_matches_raw_only() {
        let now = OffsetDateTime::now_utc();
        let t = OneTimeToken::generate(now, PASSWORD_RESET_TTL);
        assert_ne!(t.raw, t.hash);
        assert_eq!(hash_token(&t.raw), t.hash);
        assert_eq!(t.hash.len(), 64);
        assert_eq!(t.expires_at, now + Duration::minutes(10));

        let other = OneTimeToken::generate(now, PASSWORD_RESET_TTL);
        assert_ne!(t.raw, other.raw);
    }
}
