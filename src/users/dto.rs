use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Address, Role, User};

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub nationality: Option<String>,
    pub preferred_language: String,
    pub address: Option<Address>,
    pub preferences: Option<serde_json::Value>,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub is_email_verified: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            phone: u.phone.clone(),
            date_of_birth: u.date_of_birth.map(|d| d.to_string()),
            nationality: u.nationality.clone(),
            preferred_language: u.preferred_language.clone(),
            address: u.address.as_ref().map(|a| a.0.clone()),
            preferences: u.preferences.as_ref().map(|p| p.0.clone()),
            avatar_url: None,
            role: u.role,
            is_email_verified: u.is_email_verified,
            last_login: u.last_login,
            created_at: u.created_at,
        }
    }
}

/// Partial profile update; absent fields stay untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub nationality: Option<String>,
    pub preferred_language: Option<String>,
    pub address: Option<Address>,
    pub preferences: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    #[serde(with = "time::serde::rfc3339")]
    pub member_since: OffsetDateTime,
    pub days_as_member: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    pub is_email_verified: bool,
    /// Share of optional profile fields filled in, 0..=100.
    pub profile_completion: u8,
}

impl UserStats {
    pub fn of(u: &User, now: OffsetDateTime) -> Self {
        let filled = [
            u.first_name.is_some(),
            u.last_name.is_some(),
            u.phone.is_some(),
            u.date_of_birth.is_some(),
            u.nationality.is_some(),
            u.address.is_some(),
            u.avatar.is_some(),
        ];
        let done = filled.iter().filter(|f| **f).count();
        Self {
            member_since: u.created_at,
            days_as_member: (now - u.created_at).whole_days(),
            last_login: u.last_login,
            is_email_verified: u.is_email_verified,
            profile_completion: ((done * 100) / filled.len()) as u8,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}
