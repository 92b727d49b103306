//! Credential lifecycle: registration, login outcomes, token refresh,
//! e-mail verification, password reset/change and soft delete.

use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::RegisterRequest,
    jwt::{JwtKeys, TokenPair},
    tokens::{hash_token, OneTimeToken, EMAIL_VERIFICATION_TTL, PASSWORD_RESET_TTL},
};
use crate::{
    error::{AppError, AppResult},
    notify::Notice,
    state::AppState,
    users::{
        repo::DuplicateEmail,
        repo_types::{NewUser, User},
        validation::{clean, Validator},
    },
};

const BAD_CREDENTIALS: &str = "Invalid email or password";

/// A user together with a freshly issued token pair.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

fn open_session(state: &AppState, user: User) -> AppResult<Session> {
    let tokens = JwtKeys::from_ref(state).sign_pair(user.id, user.session_epoch)?;
    Ok(Session { user, tokens })
}

fn already_registered() -> AppError {
    AppError::BadRequest("User already exists with this email".into())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn notify(state: &AppState, notice: Notice) {
    if let Err(e) = state.notifier.send(notice).await {
        warn!(error = %e, "notification delivery failed");
    }
}

pub async fn load_user(state: &AppState, id: Uuid) -> AppResult<User> {
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn register(
    state: &AppState,
    req: RegisterRequest,
    now: OffsetDateTime,
) -> AppResult<Session> {
    let email = normalize_email(&req.email);
    let first_name = clean(req.first_name);
    let last_name = clean(req.last_name);
    let phone = clean(req.phone);
    let nationality = clean(req.nationality);
    let language = clean(req.preferred_language);

    let mut v = Validator::new();
    v.email("email", &email);
    v.password("password", &req.password);
    v.name("firstName", first_name.as_deref());
    v.name("lastName", last_name.as_deref());
    v.phone("phone", phone.as_deref());
    v.max_len("nationality", nationality.as_deref(), 60);
    v.language("preferredLanguage", language.as_deref());
    v.finish()?;

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(already_registered());
    }

    let password_hash = state.passwords.hash(&req.password)?;
    let verification = OneTimeToken::generate(now, EMAIL_VERIFICATION_TTL);
    let user = User::from_new(
        NewUser {
            email: email.clone(),
            password_hash,
            first_name,
            last_name,
            phone,
            nationality,
            preferred_language: language.unwrap_or_else(|| "en".into()),
            email_verification_token: verification.hash,
            email_verification_expires: verification.expires_at,
        },
        now,
    );
    // A concurrent registration can still win between the lookup and here.
    let user = state.users.insert(&user).await.map_err(|e| {
        if e.is::<DuplicateEmail>() {
            warn!(%email, "email registered concurrently");
            already_registered()
        } else {
            AppError::Internal(e)
        }
    })?;

    notify(
        state,
        Notice::VerifyEmail {
            email,
            token: verification.raw,
        },
    )
    .await;

    info!(user_id = %user.id, email = %user.email, "user registered");
    open_session(state, user)
}

pub async fn login(
    state: &AppState,
    email: &str,
    password: &str,
    now: OffsetDateTime,
) -> AppResult<Session> {
    let email = normalize_email(email);
    let mut v = Validator::new();
    v.email("email", &email);
    if password.is_empty() {
        v.push("password", "Password is required");
    }
    v.finish()?;

    let Some(mut user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        state.passwords.verify_dummy(password);
        return Err(AppError::BadRequest(BAD_CREDENTIALS.into()));
    };
    if !user.is_active {
        state.passwords.verify_dummy(password);
        return Err(AppError::BadRequest(BAD_CREDENTIALS.into()));
    }
    if let Some(until) = user.lock_until.filter(|_| user.is_locked(now)) {
        warn!(user_id = %user.id, "login on locked account");
        return Err(AppError::Locked { until });
    }

    if !state.passwords.verify(password, user.password_hash.as_deref())? {
        user.record_failed_login(now);
        state.users.update(&user).await?;
        warn!(
            user_id = %user.id,
            attempts = user.login_attempts,
            locked = user.is_locked(now),
            "login invalid password"
        );
        return Err(AppError::BadRequest(BAD_CREDENTIALS.into()));
    }

    user.record_successful_login(now);
    let user = state.users.update(&user).await?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    open_session(state, user)
}

pub async fn refresh(state: &AppState, refresh_token: &str, now: OffsetDateTime) -> AppResult<Session> {
    let claims = JwtKeys::from_ref(state)
        .verify_refresh(refresh_token)
        .map_err(|e| {
            warn!(reason = %e, "refresh token rejected");
            AppError::unauthenticated("Invalid refresh token")
        })?;
    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthenticated("User no longer exists"))?;
    if !user.is_active {
        return Err(AppError::unauthenticated("Account has been deactivated"));
    }
    if let Some(until) = user.lock_until.filter(|_| user.is_locked(now)) {
        return Err(AppError::Locked { until });
    }
    if claims.ver != user.session_epoch {
        return Err(AppError::unauthenticated("Session has been revoked"));
    }
    open_session(state, user)
}

/// Revokes every outstanding token of the user.
pub async fn logout(state: &AppState, user_id: Uuid, now: OffsetDateTime) -> AppResult<()> {
    let mut user = load_user(state, user_id).await?;
    user.revoke_sessions();
    user.updated_at = now;
    state.users.update(&user).await?;
    info!(%user_id, "user logged out");
    Ok(())
}

pub async fn verify_email(state: &AppState, raw: &str, now: OffsetDateTime) -> AppResult<User> {
    let mut user = state
        .users
        .find_by_verification_token(&hash_token(raw), now)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired verification token".into()))?;
    user.mark_email_verified(now);
    let user = state.users.update(&user).await?;
    info!(user_id = %user.id, "email verified");
    Ok(user)
}

/// Succeeds whether or not the address is known.
pub async fn forgot_password(state: &AppState, email: &str, now: OffsetDateTime) -> AppResult<()> {
    let email = normalize_email(email);
    let mut v = Validator::new();
    v.email("email", &email);
    v.finish()?;

    let Some(mut user) = state.users.find_by_email(&email).await? else {
        info!(%email, "password reset for unknown email");
        return Ok(());
    };
    if !user.is_active {
        return Ok(());
    }
    let reset = OneTimeToken::generate(now, PASSWORD_RESET_TTL);
    user.password_reset_token = Some(reset.hash);
    user.password_reset_expires = Some(reset.expires_at);
    user.updated_at = now;
    state.users.update(&user).await?;

    notify(
        state,
        Notice::ResetPassword {
            email,
            token: reset.raw,
        },
    )
    .await;
    info!(user_id = %user.id, "password reset requested");
    Ok(())
}

pub async fn reset_password(
    state: &AppState,
    raw: &str,
    new_password: &str,
    now: OffsetDateTime,
) -> AppResult<Session> {
    let mut v = Validator::new();
    v.password("password", new_password);
    v.finish()?;

    let mut user = state
        .users
        .find_by_reset_token(&hash_token(raw), now)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired reset token".into()))?;
    let hash = state.passwords.hash(new_password)?;
    user.set_password_hash(hash, now);
    let user = state.users.update(&user).await?;
    info!(user_id = %user.id, "password reset");
    open_session(state, user)
}

pub async fn change_password(
    state: &AppState,
    user_id: Uuid,
    current: &str,
    new_password: &str,
    now: OffsetDateTime,
) -> AppResult<Session> {
    let mut v = Validator::new();
    v.password("newPassword", new_password);
    if current == new_password {
        v.push("newPassword", "New password must differ from the current one");
    }
    v.finish()?;

    let mut user = load_user(state, user_id).await?;
    if !state.passwords.verify(current, user.password_hash.as_deref())? {
        warn!(%user_id, "change password with wrong current password");
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }
    let hash = state.passwords.hash(new_password)?;
    user.set_password_hash(hash, now);
    let user = state.users.update(&user).await?;
    info!(%user_id, "password changed");
    open_session(state, user)
}

pub async fn delete_account(state: &AppState, user_id: Uuid, now: OffsetDateTime) -> AppResult<()> {
    let mut user = load_user(state, user_id).await?;
    user.soft_delete(now);
    state.users.update(&user).await?;
    info!(%user_id, "account deactivated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::repo::MemoryCatalogRepo,
        notify::OutboxNotifier,
        state::{fake_config, FakeStorage},
        users::{memory::MemoryUserRepo, repo::UserRepo, repo_types::LOCK_DURATION},
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use time::Duration;

    fn register_req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: password.into(),
            first_name: Some("Amal".into()),
            last_name: Some("B".into()),
            phone: None,
            nationality: None,
            preferred_language: None,
        }
    }

    /// Never finds an e-mail, as if another registration had not committed yet.
    struct StaleLookups(MemoryUserRepo);

    #[async_trait]
    impl UserRepo for StaleLookups {
        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            self.0.find_by_id(id).await
        }
        async fn find_by_email(&self, _email: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }
        async fn find_by_verification_token(
            &self,
            token_hash: &str,
            now: OffsetDateTime,
        ) -> anyhow::Result<Option<User>> {
            self.0.find_by_verification_token(token_hash, now).await
        }
        async fn find_by_reset_token(
            &self,
            token_hash: &str,
            now: OffsetDateTime,
        ) -> anyhow::Result<Option<User>> {
            self.0.find_by_reset_token(token_hash, now).await
        }
        async fn insert(&self, user: &User) -> anyhow::Result<User> {
            self.0.insert(user).await
        }
        async fn update(&self, user: &User) -> anyhow::Result<User> {
            self.0.update(user).await
        }
        async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<User>> {
            self.0.list(limit, offset).await
        }
    }

    #[tokio::test]
    async fn concurrent_duplicate_registration_is_a_bad_request() {
        let state = AppState::from_parts(
            fake_config(),
            Arc::new(StaleLookups(MemoryUserRepo::new())),
            Arc::new(MemoryCatalogRepo::default()),
            Arc::new(FakeStorage::default()),
            Arc::new(OutboxNotifier::default()),
        )
        .unwrap();
        let now = OffsetDateTime::now_utc();
        register(&state, register_req("race@x.com", "Abcdef1"), now)
            .await
            .unwrap();

        let err = register(&state, register_req("race@x.com", "Abcdef1"), now)
            .await
            .unwrap_err();
        match err {
            AppError::BadRequest(msg) => assert!(msg.contains("already exists")),
            other => panic!("expected 400, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_email_login_is_a_generic_bad_request() {
        let state = AppState::fake();
        let err = login(&state, "ghost@x.com", "Abcdef1", OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        match err {
            AppError::BadRequest(msg) => assert_eq!(msg, BAD_CREDENTIALS),
            other => panic!("expected 400, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lockout_then_recovery_after_lock_expires() {
        let state = AppState::fake();
        let now = OffsetDateTime::now_utc();
        register(&state, register_req("lock@x.com", "Abcdef1"), now)
            .await
            .unwrap();

        for _ in 0..5 {
            let err = login(&state, "lock@x.com", "Wrong123", now).await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }
        let err = login(&state, "lock@x.com", "Abcdef1", now).await.unwrap_err();
        assert!(matches!(err, AppError::Locked { .. }));

        let later = now + LOCK_DURATION;
        let session = login(&state, "lock@x.com", "Abcdef1", later).await.unwrap();
        assert_eq!(session.user.login_attempts, 0);
        assert!(session.user.lock_until.is_none());
    }

    #[tokio::test]
    async fn soft_deleted_account_cannot_log_in() {
        let state = AppState::fake();
        let now = OffsetDateTime::now_utc();
        let s = register(&state, register_req("gone@x.com", "Abcdef1"), now)
            .await
            .unwrap();
        delete_account(&state, s.user.id, now).await.unwrap();

        assert!(state.users.find_by_email("gone@x.com").await.unwrap().is_none());
        let err = login(&state, "gone@x.com", "Abcdef1", now).await.unwrap_err();
        assert_eq!(err.to_string(), BAD_CREDENTIALS);

        // The address is free again.
        register(&state, register_req("gone@x.com", "Abcdef1"), now)
            .await
            .expect("email can be reused");
    }

    #[tokio::test]
    async fn reset_token_is_single_use_and_expires() {
        let outbox = Arc::new(OutboxNotifier::default());
        let state = AppState::fake_with_notifier(outbox.clone());
        let now = OffsetDateTime::now_utc();
        register(&state, register_req("reset@x.com", "Abcdef1"), now)
            .await
            .unwrap();
        forgot_password(&state, "Reset@X.com", now).await.unwrap();

        let token = outbox
            .sent()
            .await
            .into_iter()
            .find_map(|n| match n {
                Notice::ResetPassword { token, .. } => Some(token),
                _ => None,
            })
            .expect("reset notice");

        let late = now + PASSWORD_RESET_TTL + Duration::seconds(1);
        assert!(reset_password(&state, &token, "Newpass1", late).await.is_err());

        let session = reset_password(&state, &token, "Newpass1", now).await.unwrap();
        assert!(session.user.password_reset_token.is_none());
        assert!(reset_password(&state, &token, "Newpass2", now).await.is_err());
        login(&state, "reset@x.com", "Newpass1", now).await.unwrap();
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email_is_silent() {
        let outbox = Arc::new(OutboxNotifier::default());
        let state = AppState::fake_with_notifier(outbox.clone());
        forgot_password(&state, "nobody@x.com", OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(outbox.sent().await.is_empty());
    }

    #[tokio::test]
    async fn change_password_requires_current_and_revokes_old_tokens() {
        let state = AppState::fake();
        let now = OffsetDateTime::now_utc();
        let s = register(&state, register_req("cp@x.com", "Abcdef1"), now)
            .await
            .unwrap();

        let err = change_password(&state, s.user.id, "Nope1234", "Newpass1", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let changed = change_password(&state, s.user.id, "Abcdef1", "Newpass1", now)
            .await
            .unwrap();
        assert_eq!(changed.user.session_epoch, s.user.session_epoch + 1);
        assert!(refresh(&state, &s.tokens.refresh_token, now).await.is_err());
        assert!(refresh(&state, &changed.tokens.refresh_token, now).await.is_ok());
    }
}
