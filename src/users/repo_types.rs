use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

/// Consecutive failures before the account is locked.
pub const MAX_LOGIN_ATTEMPTS: i32 = 5;
pub const LOCK_DURATION: Duration = Duration::hours(2);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Guide,
    Admin,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Credential record. Secret columns never serialize.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<Date>,
    pub nationality: Option<String>,
    pub preferred_language: String,
    pub address: Option<Json<Address>>,
    pub preferences: Option<Json<serde_json::Value>>,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_email_verified: bool,
    #[serde(skip_serializing)]
    pub email_verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub email_verification_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<OffsetDateTime>,
    pub login_attempts: i32,
    pub lock_until: Option<OffsetDateTime>,
    pub session_epoch: i32,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields supplied at registration; the hash is computed before this exists.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub nationality: Option<String>,
    pub preferred_language: String,
    pub email_verification_token: String,
    pub email_verification_expires: OffsetDateTime,
}

impl User {
    /// Builds the in-memory record the store will persist.
    pub fn from_new(new: NewUser, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: Some(new.password_hash),
            first_name: new.first_name,
            last_name: new.last_name,
            phone: new.phone,
            date_of_birth: None,
            nationality: new.nationality,
            preferred_language: new.preferred_language,
            address: None,
            preferences: None,
            avatar: None,
            role: Role::User,
            is_active: true,
            is_email_verified: false,
            email_verification_token: Some(new.email_verification_token),
            email_verification_expires: Some(new.email_verification_expires),
            password_reset_token: None,
            password_reset_expires: None,
            login_attempts: 0,
            lock_until: None,
            session_epoch: 0,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A lock in the past counts as no lock.
    pub fn is_locked(&self, now: OffsetDateTime) -> bool {
        matches!(self.lock_until, Some(until) if until > now)
    }

    pub fn record_failed_login(&mut self, now: OffsetDateTime) {
        if matches!(self.lock_until, Some(until) if until <= now) {
            self.login_attempts = 1;
            self.lock_until = None;
        } else {
            self.login_attempts += 1;
            if self.login_attempts >= MAX_LOGIN_ATTEMPTS && !self.is_locked(now) {
                self.lock_until = Some(now + LOCK_DURATION);
            }
        }
        self.updated_at = now;
    }

    pub fn record_successful_login(&mut self, now: OffsetDateTime) {
        self.login_attempts = 0;
        self.lock_until = None;
        self.last_login = Some(now);
        self.updated_at = now;
    }

    /// Invalidates every token issued before this call.
    pub fn revoke_sessions(&mut self) {
        self.session_epoch += 1;
    }

    pub fn set_password_hash(&mut self, hash: String, now: OffsetDateTime) {
        self.password_hash = Some(hash);
        self.password_reset_token = None;
        self.password_reset_expires = None;
        self.login_attempts = 0;
        self.lock_until = None;
        self.revoke_sessions();
        self.updated_at = now;
    }

    pub fn mark_email_verified(&mut self, now: OffsetDateTime) {
        self.is_email_verified = true;
        self.email_verification_token = None;
        self.email_verification_expires = None;
        self.updated_at = now;
    }

    /// Deactivates the account and frees its e-mail for a new registration.
    pub fn soft_delete(&mut self, now: OffsetDateTime) {
        self.is_active = false;
        self.email = format!("deleted_{}_{}_{}", self.id, now.unix_timestamp(), self.email);
        self.revoke_sessions();
        self.updated_at = now;
    }

    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (Some(f), None) => Some(f.clone()),
            (None, Some(l)) => Some(l.clone()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(now: OffsetDateTime) -> User {
        User::from_new(
            NewUser {
                email: "amal@example.com".into(),
                password_hash: "$argon2id$fake".into(),
                first_name: Some("Amal".into()),
                last_name: Some("B".into()),
                phone: None,
                nationality: None,
                preferred_language: "en".into(),
                email_verification_token: "digest".into(),
                email_verification_expires: now + Duration::hours(24),
            },
            now,
        )
    }

    #[test]
    fn fifth_failure_locks_for_two_hours() {
        let now = OffsetDateTime::now_utc();
        let mut u = user(now);
        for i in 1..MAX_LOGIN_ATTEMPTS {
            u.record_failed_login(now);
            assert_eq!(u.login_attempts, i);
            assert!(!u.is_locked(now));
        }
        u.record_failed_login(now);
        assert_eq!(u.login_attempts, MAX_LOGIN_ATTEMPTS);
        assert!(u.is_locked(now));
        assert!(u.is_locked(now + LOCK_DURATION - Duration::seconds(1)));
        assert!(!u.is_locked(now + LOCK_DURATION));
    }

    #[test]
    fn expired_lock_restarts_counter() {
        let now = OffsetDateTime::now_utc();
        let mut u = user(now);
        for _ in 0..MAX_LOGIN_ATTEMPTS {
            u.record_failed_login(now);
        }
        let later = now + LOCK_DURATION + Duration::minutes(1);
        u.record_failed_login(later);
        assert_eq!(u.login_attempts, 1);
        assert!(u.lock_until.is_none());
    }

    #[test]
    fn success_resets_counter_and_lock() {
        let now = OffsetDateTime::now_utc();
        let mut u = user(now);
        for _ in 0..MAX_LOGIN_ATTEMPTS {
            u.record_failed_login(now);
        }
        let later = now + LOCK_DURATION;
        u.record_successful_login(later);
        assert_eq!(u.login_attempts, 0);
        assert!(u.lock_until.is_none());
        assert_eq!(u.last_login, Some(later));
    }

    #[test]
    fn soft_delete_rewrites_email_and_revokes() {
        let now = OffsetDateTime::now_utc();
        let mut u = user(now);
        u.soft_delete(now);
        assert!(!u.is_active);
        assert_ne!(u.email, "amal@example.com");
        assert!(u.email.ends_with("_amal@example.com"));
        assert_eq!(u.session_epoch, 1);
    }

    #[test]
    fn serialization_skips_secrets() {
        let now = OffsetDateTime::now_utc();
        let mut u = user(now);
        u.password_reset_token = Some("reset-digest".into());
        let json = serde_json::to_string(&u).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("$argon2id$fake"));
        assert!(!json.contains("email_verification_token"));
        assert!(!json.contains("reset-digest"));
    }
}
