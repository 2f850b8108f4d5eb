use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use super::check_auth;
use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{ApprovalStatus, Booking, EngineSettings, SettingsUpdate};
use crate::services::approval;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub approval_status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let filter = match query.approval_status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(ApprovalStatus::parse(s).ok_or_else(|| {
            AppError::BadRequest("approval_status must be 'approved', 'pending', or 'rejected'".to_string())
        })?),
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let bookings = {
        let conn = db::lock(&state.db)?;
        queries::get_bookings(&conn, filter, limit)?
    };

    Ok(Json(bookings))
}

// POST /api/admin/bookings/:id/approve
#[derive(Deserialize)]
pub struct ApproveRequest {
    pub admin_id: i64,
}

pub async fn approve_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let booking = approval::approve_booking(&state.db, &id, req.admin_id)?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/reject
#[derive(Deserialize)]
pub struct RejectRequest {
    pub admin_id: i64,
    #[serde(default)]
    pub reason: String,
}

pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let booking = approval::reject_booking(&state.db, &id, req.admin_id, &req.reason)?;
    Ok(Json(booking))
}

// GET /api/admin/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<EngineSettings>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    Ok(Json(state.engine_settings()?))
}

// POST /api/admin/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<EngineSettings>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let pairs = update.into_pairs();
    let settings = {
        let conn = db::lock(&state.db)?;
        let tx = conn.unchecked_transaction().map_err(anyhow::Error::from)?;
        for (key, value) in &pairs {
            queries::set_setting(&tx, key, value)?;
        }
        tx.commit().map_err(anyhow::Error::from)?;
        queries::load_engine_settings(&conn)?
    };

    tracing::info!(keys = pairs.len(), "Settings updated");
    Ok(Json(settings))
}
