use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{Booking, BookingRequest};
use crate::services::booking;
use crate::state::AppState;

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let settings = state.engine_settings()?;
    let booking = booking::create_booking(&state.db, state.holiday_api.as_ref(), &settings, &req).await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let booking = {
        let conn = db::lock(&state.db)?;
        queries::get_booking_by_id(&conn, &id)?
    };

    booking
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}
