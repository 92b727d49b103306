//! Mock reservations: the request is echoed back with a confirmation id and
//! nothing is stored.

use axum::{http::StatusCode, routing::post, Json, Router};
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, instrument};

use crate::{
    auth::extractors::MaybeAuthUser,
    error::{AppError, AppResult},
    extract::AppJson,
    response::ApiResponse,
    state::AppState,
};

const CONFIRMATION_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingKind {
    Hotel,
    Rental,
    Restaurant,
    Car,
}

impl BookingKind {
    pub fn prefix(self) -> &'static str {
        match self {
            BookingKind::Hotel => "HTL",
            BookingKind::Rental => "RNT",
            BookingKind::Restaurant => "RST",
            BookingKind::Car => "CAR",
        }
    }

    fn label(self) -> &'static str {
        match self {
            BookingKind::Hotel => "hotel",
            BookingKind::Rental => "rental",
            BookingKind::Restaurant => "restaurant",
            BookingKind::Car => "car",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub confirmation_id: String,
    pub booking: Value,
}

pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings/hotels", post(book_hotel))
        .route("/bookings/rentals", post(book_rental))
        .route("/bookings/restaurants", post(book_restaurant))
        .route("/bookings/cars", post(book_car))
}

/// `HTL-7Q2K9XZA` style id: kind prefix plus uppercase alphanumerics.
pub fn confirmation_id(kind: BookingKind) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CONFIRMATION_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{}-{}", kind.prefix(), suffix)
}

pub fn confirm(
    kind: BookingKind,
    details: Value,
    user_id: Option<String>,
    now: OffsetDateTime,
) -> AppResult<BookingConfirmation> {
    let Value::Object(mut booking) = details else {
        return Err(AppError::BadRequest(
            "Booking details must be a JSON object".into(),
        ));
    };
    if booking.is_empty() {
        return Err(AppError::BadRequest("Booking details are required".into()));
    }
    let confirmation_id = confirmation_id(kind);
    let booked_at = now.format(&Rfc3339).map_err(anyhow::Error::from)?;

    let mut meta = Map::new();
    meta.insert("type".into(), Value::from(kind.label()));
    meta.insert("status".into(), Value::from("confirmed"));
    meta.insert("bookedAt".into(), Value::from(booked_at));
    if let Some(id) = user_id {
        meta.insert("userId".into(), Value::from(id));
    }
    booking.extend(meta);

    Ok(BookingConfirmation {
        confirmation_id,
        booking: Value::Object(booking),
    })
}

async fn book(
    kind: BookingKind,
    viewer: MaybeAuthUser,
    details: Value,
) -> AppResult<(StatusCode, Json<ApiResponse<BookingConfirmation>>)> {
    let user_id = viewer.0.map(|identity| identity.id.to_string());
    let signed_in = user_id.is_some();
    let confirmation = confirm(kind, details, user_id, OffsetDateTime::now_utc())?;
    info!(
        kind = kind.label(),
        confirmation_id = %confirmation.confirmation_id,
        signed_in,
        "booking confirmed"
    );
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(confirmation).with_message("Booking confirmed")),
    ))
}

#[instrument(skip_all)]
pub async fn book_hotel(
    viewer: MaybeAuthUser,
    AppJson(details): AppJson<Value>,
) -> AppResult<(StatusCode, Json<ApiResponse<BookingConfirmation>>)> {
    book(BookingKind::Hotel, viewer, details).await
}

#[instrument(skip_all)]
pub async fn book_rental(
    viewer: MaybeAuthUser,
    AppJson(details): AppJson<Value>,
) -> AppResult<(StatusCode, Json<ApiResponse<BookingConfirmation>>)> {
    book(BookingKind::Rental, viewer, details).await
}

#[instrument(skip_all)]
pub async fn book_restaurant(
    viewer: MaybeAuthUser,
    AppJson(details): AppJson<Value>,
) -> AppResult<(StatusCode, Json<ApiResponse<BookingConfirmation>>)> {
    book(BookingKind::Restaurant, viewer, details).await
}

#[instrument(skip_all)]
pub async fn book_car(
    viewer: MaybeAuthUser,
    AppJson(details): AppJson<Value>,
) -> AppResult<(StatusCode, Json<ApiResponse<BookingConfirmation>>)> {
    book(BookingKind::Car, viewer, details).await
}
