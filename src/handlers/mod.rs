pub mod admin;
pub mod booking_times;
pub mod bookings;
pub mod health;
pub mod holidays;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::errors::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/booking-times/available",
            get(booking_times::available_slots),
        )
        .route(
            "/api/booking-times/rules-for-date",
            get(booking_times::rules_for_date),
        )
        .route(
            "/api/booking-times/rules",
            get(booking_times::list_rules)
                .post(booking_times::create_rule)
                .put(booking_times::update_rules),
        )
        .route(
            "/api/booking-times/rules/:id",
            delete(booking_times::delete_rule),
        )
        .route(
            "/api/holidays",
            get(holidays::list_holidays).post(holidays::create_holiday),
        )
        .route(
            "/api/holidays/:id",
            put(holidays::update_holiday).delete(holidays::delete_holiday),
        )
        .route("/api/holidays/refresh", post(holidays::refresh_holidays))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/admin/bookings", get(admin::get_bookings))
        .route(
            "/api/admin/bookings/:id/approve",
            post(admin::approve_booking),
        )
        .route(
            "/api/admin/bookings/:id/reject",
            post(admin::reject_booking),
        )
        .route(
            "/api/admin/settings",
            get(admin::get_settings).post(admin::update_settings),
        )
        .with_state(state)
}

pub(crate) fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
