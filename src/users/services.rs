use anyhow::Context;
use bytes::Bytes;
use sqlx::types::Json;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::UpdateProfileRequest,
    repo_types::User,
    validation::{clean, Validator},
};
use crate::{
    auth::services::load_user,
    error::{AppError, AppResult},
    state::AppState,
    storage::{avatar_key, ext_from_mime},
};

pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// Applies a partial profile update. A blank string clears an optional field.
pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    req: UpdateProfileRequest,
    now: OffsetDateTime,
) -> AppResult<User> {
    let mut v = Validator::new();
    let first_name = req.first_name.map(|s| clean(Some(s)));
    let last_name = req.last_name.map(|s| clean(Some(s)));
    let phone = req.phone.map(|s| clean(Some(s)));
    let nationality = req.nationality.map(|s| clean(Some(s)));
    let language = clean(req.preferred_language);
    let birth = req.date_of_birth.map(|s| clean(Some(s)));

    v.name("firstName", first_name.as_ref().and_then(|f| f.as_deref()));
    v.name("lastName", last_name.as_ref().and_then(|f| f.as_deref()));
    v.phone("phone", phone.as_ref().and_then(|f| f.as_deref()));
    v.max_len("nationality", nationality.as_ref().and_then(|f| f.as_deref()), 60);
    v.language("preferredLanguage", language.as_deref());
    let date_of_birth = birth
        .as_ref()
        .map(|b| v.birth_date("dateOfBirth", b.as_deref()));
    if let Some(address) = &req.address {
        for (field, value, max) in [
            ("address.street", &address.street, 200),
            ("address.city", &address.city, 100),
            ("address.region", &address.region, 100),
            ("address.postalCode", &address.postal_code, 20),
            ("address.country", &address.country, 100),
        ] {
            v.max_len(field, value.as_deref(), max);
        }
    }
    if matches!(&req.preferences, Some(p) if !p.is_object()) {
        v.push("preferences", "Preferences must be an object");
    }
    v.finish()?;

    let mut user = load_user(state, user_id).await?;
    if let Some(first_name) = first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = last_name {
        user.last_name = last_name;
    }
    if let Some(phone) = phone {
        user.phone = phone;
    }
    if let Some(nationality) = nationality {
        user.nationality = nationality;
    }
    if let Some(language) = language {
        user.preferred_language = language;
    }
    if let Some(date) = date_of_birth {
        user.date_of_birth = date;
    }
    if let Some(address) = req.address {
        user.address = Some(Json(address));
    }
    if let Some(preferences) = req.preferences {
        user.preferences = Some(Json(preferences));
    }
    user.updated_at = now;

    let user = state.users.update(&user).await?;
    info!(%user_id, "profile updated");
    Ok(user)
}

/// Stores a new avatar object and drops the previous one.
pub async fn set_avatar(
    state: &AppState,
    user_id: Uuid,
    body: Bytes,
    content_type: &str,
    now: OffsetDateTime,
) -> AppResult<User> {
    let ext = ext_from_mime(content_type).ok_or_else(|| {
        AppError::BadRequest("Only JPEG, PNG and WebP images are allowed".into())
    })?;
    if body.is_empty() {
        return Err(AppError::BadRequest("Avatar file is empty".into()));
    }
    if body.len() > MAX_AVATAR_BYTES {
        return Err(AppError::BadRequest("Avatar must be at most 5MB".into()));
    }

    let mut user = load_user(state, user_id).await?;
    let key = avatar_key(user_id, ext);
    state
        .storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    if let Some(old) = user.avatar.replace(key) {
        if let Err(e) = state.storage.delete_object(&old).await {
            warn!(error = %e, key = %old, "failed to delete previous avatar");
        }
    }
    user.updated_at = now;
    let user = state.users.update(&user).await?;
    info!(%user_id, "avatar updated");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::{Address, NewUser};
    use time::Duration;

    async fn seeded(state: &AppState) -> User {
        let now = OffsetDateTime::now_utc();
        let user = User::from_new(
            NewUser {
                email: "profile@x.com".into(),
                password_hash: state.passwords.hash("Abcdef1").unwrap(),
                first_name: Some("Amal".into()),
                last_name: Some("Bennani".into()),
                phone: None,
                nationality: None,
                preferred_language: "en".into(),
                email_verification_token: "digest".into(),
                email_verification_expires: now + Duration::hours(24),
            },
            now,
        );
        state.users.insert(&user).await.unwrap()
    }

    #[tokio::test]
    async fn partial_update_keeps_untouched_fields() {
        let state = AppState::fake();
        let user = seeded(&state).await;
        let req = UpdateProfileRequest {
            last_name: Some("  ".into()),
            date_of_birth: Some("1990-05-01".into()),
            preferred_language: Some("fr".into()),
            address: Some(Address {
                city: Some("Fes".into()),
                ..Address::default()
            }),
            ..UpdateProfileRequest::default()
        };
        let updated = update_profile(&state, user.id, req, OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Amal"));
        assert_eq!(updated.last_name, None);
        assert_eq!(updated.preferred_language, "fr");
        assert_eq!(updated.date_of_birth.map(|d| d.year()), Some(1990));
        assert_eq!(
            updated.address.map(|a| a.0.city),
            Some(Some("Fes".to_string()))
        );
    }

    #[tokio::test]
    async fn invalid_update_changes_nothing() {
        let state = AppState::fake();
        let user = seeded(&state).await;
        let req = UpdateProfileRequest {
            first_name: Some("R2D2".into()),
            preferred_language: Some("de".into()),
            ..UpdateProfileRequest::default()
        };
        let err = update_profile(&state, user.id, req, OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        match err {
            AppError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        let stored = state.users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.first_name.as_deref(), Some("Amal"));
    }

    #[tokio::test]
    async fn avatar_rejects_unknown_types_and_replaces_key() {
        let state = AppState::fake();
        let user = seeded(&state).await;
        let now = OffsetDateTime::now_utc();

        let err = set_avatar(&state, user.id, Bytes::from_static(b"gif"), "image/gif", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let first = set_avatar(&state, user.id, Bytes::from_static(b"png"), "image/png", now)
            .await
            .unwrap();
        let key = first.avatar.clone().unwrap();
        assert!(key.starts_with(&format!("avatars/{}/", user.id)));
        assert!(key.ends_with(".png"));

        let second = set_avatar(&state, user.id, Bytes::from_static(b"jpg"), "image/jpeg", now)
            .await
            .unwrap();
        assert_ne!(second.avatar, Some(key));
    }
}
