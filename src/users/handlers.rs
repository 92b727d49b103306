use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, FromRef, Multipart, State},
    handler::Handler,
    http::HeaderMap,
    middleware,
    routing::{get, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::{
    dto::{ChangePasswordRequest, Pagination, PublicUser, UpdateProfileRequest, UserStats},
    repo_types::User,
    services::{self, MAX_AVATAR_BYTES},
};
use crate::{
    auth::{
        cookies,
        extractors::{AdminOnly, AuthUser, Restricted},
        handlers::{session_reply, AuthReply},
        jwt::JwtKeys,
        services as auth_services,
    },
    error::{AppError, AppResult},
    extract::{AppJson, AppQuery},
    rate_limit::{enforce, RateGate},
    response::ApiResponse,
    state::AppState,
    storage::AVATAR_URL_TTL_SECS,
};

pub fn users_routes(state: &AppState) -> Router<AppState> {
    let keys = JwtKeys::from_ref(state);
    let trust_proxy = state.config.trust_proxy;
    let change_gate = RateGate::new(&state.limits.change_password, keys.clone(), trust_proxy);
    let delete_gate = RateGate::new(&state.limits.delete_account, keys, trust_proxy);

    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/profile",
            get(get_profile).put(update_profile).delete(
                delete_account.layer(middleware::from_fn_with_state(delete_gate, enforce)),
            ),
        )
        .route("/users/stats", get(get_stats))
        .route(
            "/users/avatar",
            put(upload_avatar).layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES + 64 * 1024)),
        )
        .merge(
            Router::new()
                .route("/users/change-password", put(change_password))
                .route_layer(middleware::from_fn_with_state(change_gate, enforce)),
        )
}

/// Sanitized view of a record, with a short-lived link to the avatar.
pub async fn present(state: &AppState, user: &User) -> PublicUser {
    let mut public = PublicUser::from(user);
    if let Some(key) = &user.avatar {
        match state.storage.presign_get(key, AVATAR_URL_TTL_SECS).await {
            Ok(url) => public.avatar_url = Some(url),
            Err(e) => warn!(error = %e, %key, "presign avatar failed"),
        }
    }
    public
}

#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<PublicUser>>> {
    let record = auth_services::load_user(&state, user.0.id).await?;
    Ok(Json(ApiResponse::ok(present(&state, &record).await)))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.0.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> AppResult<Json<ApiResponse<PublicUser>>> {
    let record =
        services::update_profile(&state, user.0.id, payload, OffsetDateTime::now_utc()).await?;
    Ok(Json(
        ApiResponse::ok(present(&state, &record).await)
            .with_message("Profile updated successfully"),
    ))
}

/// PUT /users/avatar (multipart, field `avatar`)
#[instrument(skip(state, user, mp), fields(user_id = %user.0.id))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<ApiResponse<PublicUser>>> {
    user.0.require_verified()?;
    let mut mp = mp?;

    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("avatar") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        upload = Some((data, content_type));
        break;
    }
    let (data, content_type) =
        upload.ok_or_else(|| AppError::BadRequest("Please upload an image file".into()))?;
    debug!(size = data.len(), %content_type, "avatar received");

    let record =
        services::set_avatar(&state, user.0.id, data, &content_type, OffsetDateTime::now_utc())
            .await?;
    Ok(Json(
        ApiResponse::ok(present(&state, &record).await)
            .with_message("Avatar updated successfully"),
    ))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.0.id))]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> AppResult<AuthReply> {
    let session = auth_services::change_password(
        &state,
        user.0.id,
        &payload.current_password,
        &payload.new_password,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(session_reply(&state, session, "Password changed successfully").await)
}

#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn delete_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<(HeaderMap, Json<ApiResponse<()>>)> {
    auth_services::delete_account(&state, user.0.id, OffsetDateTime::now_utc()).await?;
    Ok((
        cookies::clear_session_cookies(state.config.production),
        Json(ApiResponse::message("Account deleted successfully")),
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn get_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<UserStats>>> {
    let record = auth_services::load_user(&state, user.0.id).await?;
    Ok(Json(ApiResponse::ok(UserStats::of(
        &record,
        OffsetDateTime::now_utc(),
    ))))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn list_users(
    State(state): State<AppState>,
    admin: Restricted<AdminOnly>,
    AppQuery(page): AppQuery<Pagination>,
) -> AppResult<Json<ApiResponse<Vec<PublicUser>>>> {
    let limit = page.limit.clamp(1, 100);
    let offset = page.offset.max(0);
    let records = state.users.list(limit, offset).await?;
    let mut users = Vec::with_capacity(records.len());
    for record in &records {
        users.push(present(&state, record).await);
    }
    Ok(Json(ApiResponse::list(users)))
}
