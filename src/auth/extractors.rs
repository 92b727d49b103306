use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{cookies, jwt::JwtKeys};
use crate::{
    error::AppError,
    state::AppState,
    users::repo_types::{Role, User},
};

/// Who is calling. Built by the session pipeline; carries no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
}

impl Identity {
    pub fn require_verified(&self) -> Result<(), AppError> {
        if self.email_verified {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Please verify your email address first".into(),
            ))
        }
    }
}

impl From<&User> for Identity {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            role: u.role,
            email_verified: u.is_email_verified,
        }
    }
}

/// Runs extract → verify → load → active/lock/epoch gates.
pub async fn authenticate(parts: &Parts, state: &AppState) -> Result<Identity, AppError> {
    let token = cookies::access_token(&parts.headers)
        .ok_or_else(|| AppError::unauthenticated("Not authorized, no token"))?;

    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify_access(token).map_err(|e| {
        debug!(reason = %e, "access token rejected");
        AppError::unauthenticated("Not authorized, token invalid")
    })?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "token subject no longer exists");
            AppError::unauthenticated("User no longer exists")
        })?;

    if !user.is_active {
        return Err(AppError::unauthenticated("Account has been deactivated"));
    }
    let now = OffsetDateTime::now_utc();
    if let Some(until) = user.lock_until.filter(|_| user.is_locked(now)) {
        return Err(AppError::Locked { until });
    }
    if claims.ver != user.session_epoch {
        debug!(user_id = %user.id, "token from a revoked session");
        return Err(AppError::unauthenticated("Session has been revoked"));
    }

    Ok(Identity::from(&user))
}

/// Requires a valid session.
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await.map(AuthUser)
    }
}

/// Same pipeline, but any failure just means "anonymous".
pub struct MaybeAuthUser(pub Option<Identity>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(authenticate(parts, state).await.ok()))
    }
}

pub fn require_role<'a>(
    identity: Option<&'a Identity>,
    allowed: &[Role],
) -> Result<&'a Identity, AppError> {
    let identity =
        identity.ok_or_else(|| AppError::unauthenticated("Not authorized, no session"))?;
    if !allowed.contains(&identity.role) {
        warn!(user_id = %identity.id, role = ?identity.role, "role not allowed");
        return Err(AppError::Forbidden(format!(
            "Role {:?} is not authorized to access this route",
            identity.role
        )));
    }
    Ok(identity)
}

/// The set of roles a restricted route admits.
pub trait RolePolicy: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

pub struct AdminOnly;

impl RolePolicy for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Session plus role gate, e.g. `Restricted<AdminOnly>`.
pub struct Restricted<P: RolePolicy>(pub Identity, PhantomData<P>);

#[async_trait]
impl<P: RolePolicy> FromRequestParts<AppState> for Restricted<P> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = authenticate(parts, state).await?;
        require_role(Some(&identity), P::ALLOWED)?;
        Ok(Restricted(identity, PhantomData))
    }
}
