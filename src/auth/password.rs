use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::HashConfig;

/// Salted one-way password hashing with a fixed work factor.
#[derive(Clone)]
pub struct Passwords {
    argon2: Argon2<'static>,
    /// Hash of a throwaway secret, verified against when there is no account.
    dummy: String,
}

impl Passwords {
    pub fn new(cfg: &HashConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, 1, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        let dummy = argon2
            .hash_password(b"marhba-bik-unused", &salt)
            .map_err(|e| anyhow::anyhow!("argon2 dummy hash: {e}"))?
            .to_string();
        Ok(Self { argon2, dummy })
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` when the account has no password hash at all.
    pub fn verify(&self, plain: &str, hash: Option<&str>) -> anyhow::Result<bool> {
        let Some(hash) = hash else {
            return Ok(false);
        };
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// Pays the cost of a real `verify` for a login with no matching account,
    /// so response time does not tell known e-mails apart.
    pub fn verify_dummy(&self, plain: &str) {
        let _ = self.verify(plain, Some(&self.dummy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passwords() -> Passwords {
        Passwords::new(&HashConfig {
            memory_kib: 1024,
            iterations: 1,
        })
        .expect("params")
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let pw = passwords();
        let hash = pw.hash("Secur3P@ssw0rd!").expect("hashing should succeed");
        assert!(pw.verify("Secur3P@ssw0rd!", Some(&hash)).expect("verify should succeed"));
        assert!(!pw.verify("Secur3P@ssw0rd?", Some(&hash)).expect("verify should not error"));
    }

    #[test]
    fn same_password_gets_fresh_salt() {
        let pw = passwords();
        let a = pw.hash("Abcdef1").unwrap();
        let b = pw.hash("Abcdef1").unwrap();
        assert_ne!(a, b);
        assert!(pw.verify("Abcdef1", Some(&b)).unwrap());
    }

    #[test]
    fn missing_hash_is_false_not_error() {
        assert!(!passwords().verify("anything", None).unwrap());
    }

    #[test]
    fn dummy_hash_is_real_and_never_matches() {
        let pw = passwords();
        assert!(PasswordHash::new(&pw.dummy).is_ok());
        assert!(!pw.verify("Abcdef1", Some(&pw.dummy)).unwrap());
        pw.verify_dummy("Abcdef1");
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = passwords().verify("anything", Some("not-a-valid-hash")).unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
