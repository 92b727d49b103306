use axum::{
    extract::{FromRef, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use super::{
    cookies,
    dto::{
        AuthResponse, ForgotPasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
        ResetPasswordRequest,
    },
    extractors::AuthUser,
    jwt::JwtKeys,
    services::{self, Session},
};
use crate::{
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    rate_limit::{enforce, RateGate},
    response::ApiResponse,
    state::AppState,
    users::handlers::present,
};

pub type AuthReply = (HeaderMap, Json<ApiResponse<AuthResponse>>);

pub fn auth_routes(state: &AppState) -> Router<AppState> {
    let keys = JwtKeys::from_ref(state);
    let trust_proxy = state.config.trust_proxy;
    let login_gate = RateGate::new(&state.limits.login, keys.clone(), trust_proxy);
    let forgot_gate = RateGate::new(&state.limits.forgot_password, keys, trust_proxy);

    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
        .route("/auth/verify-email/:token", get(verify_email))
        .route("/auth/reset-password/:token", put(reset_password))
        .merge(
            Router::new()
                .route("/auth/login", post(login))
                .route_layer(middleware::from_fn_with_state(login_gate, enforce)),
        )
        .merge(
            Router::new()
                .route("/auth/forgot-password", post(forgot_password))
                .route_layer(middleware::from_fn_with_state(forgot_gate, enforce)),
        )
}

/// Body plus `Set-Cookie` headers for a freshly opened session.
pub async fn session_reply(
    state: &AppState,
    session: Session,
    message: &str,
) -> AuthReply {
    let keys = JwtKeys::from_ref(state);
    let headers = cookies::session_cookies(
        &session.tokens,
        keys.access_ttl.as_secs(),
        keys.refresh_ttl.as_secs(),
        state.config.production,
    );
    let body = AuthResponse {
        user: present(state, &session.user).await,
        access_token: session.tokens.access_token,
        refresh_token: session.tokens.refresh_token,
    };
    (headers, Json(ApiResponse::ok(body).with_message(message)))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, AuthReply)> {
    let session = services::register(&state, payload, OffsetDateTime::now_utc()).await?;
    let reply = session_reply(
        &state,
        session,
        "User registered successfully. Please check your email to verify your account.",
    )
    .await;
    Ok((StatusCode::CREATED, reply))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<AuthReply> {
    let session = services::login(
        &state,
        &payload.email,
        &payload.password,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(session_reply(&state, session, "Login successful").await)
}

#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<(HeaderMap, Json<ApiResponse<()>>)> {
    services::logout(&state, user.0.id, OffsetDateTime::now_utc()).await?;
    Ok((
        cookies::clear_session_cookies(state.config.production),
        Json(ApiResponse::message("Logged out successfully")),
    ))
}

/// Accepts the refresh token from the body or the `refreshToken` cookie.
#[instrument(skip(state, headers, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> AppResult<AuthReply> {
    let from_body = payload.and_then(|Json(p)| p.refresh_token);
    let token = from_body
        .as_deref()
        .or_else(|| cookies::cookie_value(&headers, cookies::REFRESH_COOKIE))
        .ok_or_else(|| AppError::unauthenticated("Refresh token required"))?;
    let session = services::refresh(&state, token, OffsetDateTime::now_utc()).await?;
    Ok(session_reply(&state, session, "Token refreshed").await)
}

#[instrument(skip(state, token))]
pub async fn verify_email(
    State(state): State<AppState>,
    AppPath(token): AppPath<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    services::verify_email(&state, &token, OffsetDateTime::now_utc()).await?;
    Ok(Json(ApiResponse::message("Email verified successfully")))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    services::forgot_password(&state, &payload.email, OffsetDateTime::now_utc()).await?;
    Ok(Json(ApiResponse::message(
        "If an account exists for that email, a reset link has been sent",
    )))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppPath(token): AppPath<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> AppResult<AuthReply> {
    let session =
        services::reset_password(&state, &token, &payload.password, OffsetDateTime::now_utc())
            .await?;
    Ok(session_reply(&state, session, "Password reset successful").await)
}
