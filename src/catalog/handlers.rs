use axum::{extract::State, routing::get, Json, Router};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::repo_types::{Hotel, ListingFilter, Rental, Restaurant};
use crate::{
    auth::extractors::MaybeAuthUser,
    error::{AppError, AppResult},
    extract::{AppPath, AppQuery},
    response::ApiResponse,
    state::AppState,
};

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/hotels", get(list_hotels))
        .route("/hotels/:id", get(get_hotel))
        .route("/restaurants", get(list_restaurants))
        .route("/restaurants/:id", get(get_restaurant))
        .route("/rentals", get(list_rentals))
        .route("/rentals/:id", get(get_rental))
}

#[instrument(skip(state, viewer))]
pub async fn list_hotels(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    AppQuery(filter): AppQuery<ListingFilter>,
) -> AppResult<Json<ApiResponse<Vec<Hotel>>>> {
    let filter = filter.normalized()?;
    let hotels = state.catalog.hotels(&filter).await?;
    debug!(count = hotels.len(), signed_in = viewer.is_some(), "hotels listed");
    Ok(Json(ApiResponse::list(hotels)))
}

#[instrument(skip(state))]
pub async fn get_hotel(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Hotel>>> {
    let hotel = state
        .catalog
        .hotel(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Hotel not found".into()))?;
    Ok(Json(ApiResponse::ok(hotel)))
}

#[instrument(skip(state, viewer))]
pub async fn list_restaurants(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    AppQuery(filter): AppQuery<ListingFilter>,
) -> AppResult<Json<ApiResponse<Vec<Restaurant>>>> {
    let filter = filter.normalized()?;
    let restaurants = state.catalog.restaurants(&filter).await?;
    debug!(count = restaurants.len(), signed_in = viewer.is_some(), "restaurants listed");
    Ok(Json(ApiResponse::list(restaurants)))
}

#[instrument(skip(state))]
pub async fn get_restaurant(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Restaurant>>> {
    let restaurant = state
        .catalog
        .restaurant(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Restaurant not found".into()))?;
    Ok(Json(ApiResponse::ok(restaurant)))
}

#[instrument(skip(state, viewer))]
pub async fn list_rentals(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    AppQuery(filter): AppQuery<ListingFilter>,
) -> AppResult<Json<ApiResponse<Vec<Rental>>>> {
    let filter = filter.normalized()?;
    let rentals = state.catalog.rentals(&filter).await?;
    debug!(count = rentals.len(), signed_in = viewer.is_some(), "rentals listed");
    Ok(Json(ApiResponse::list(rentals)))
}

#[instrument(skip(state))]
pub async fn get_rental(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Rental>>> {
    let rental = state
        .catalog
        .rental(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Rental not found".into()))?;
    Ok(Json(ApiResponse::ok(rental)))
}
