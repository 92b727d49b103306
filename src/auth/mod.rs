use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod cookies;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod services;
pub mod tokens;

pub fn router(state: &AppState) -> Router<AppState> {
    handlers::auth_routes(state)
}
