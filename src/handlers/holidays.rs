use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::check_auth;
use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{HolidayDraft, HolidayEntry, HolidayUpdate};
use crate::services::holidays::{CacheOutcome, HolidayCalendar};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

impl YearQuery {
    fn year_or_current(&self) -> Result<i32, AppError> {
        match self.year {
            Some(y) if !(1900..=2999).contains(&y) => {
                Err(AppError::BadRequest(format!("year {y} is out of range")))
            }
            Some(y) => Ok(y),
            None => Ok(Utc::now().year()),
        }
    }
}

// GET /api/holidays?year=
pub async fn list_holidays(
    State(state): State<Arc<AppState>>,
    Query(query): Query<YearQuery>,
) -> Result<Json<Vec<HolidayEntry>>, AppError> {
    let year = query.year_or_current()?;
    let settings = state.engine_settings()?;
    let calendar = HolidayCalendar::new(&state.db, state.holiday_api.as_ref(), &settings);

    Ok(Json(calendar.holidays_for_year(year).await?))
}

// POST /api/holidays
pub async fn create_holiday(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<HolidayDraft>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let holiday = draft.validate()?;

    let id = {
        let conn = db::lock(&state.db)?;
        if queries::holiday_exists_on(&conn, &holiday.date)? {
            return Err(AppError::Conflict(format!(
                "a holiday on {} already exists",
                holiday.date
            )));
        }
        queries::create_holiday(&conn, &holiday)?
    };

    tracing::info!(holiday_id = id, date = %holiday.date, name = %holiday.name, "Holiday created");
    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

// PUT /api/holidays/:id
pub async fn update_holiday(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(update): Json<HolidayUpdate>,
) -> Result<Json<HolidayEntry>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let name = update.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }

    let conn = db::lock(&state.db)?;
    if !queries::update_holiday(&conn, id, name, update.is_active)? {
        return Err(AppError::NotFound(format!("holiday {id}")));
    }
    let holiday = queries::get_holiday(&conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("holiday {id}")))?;

    tracing::info!(holiday_id = id, active = holiday.active, "Holiday updated");
    Ok(Json(holiday))
}

// DELETE /api/holidays/:id
pub async fn delete_holiday(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let deleted = {
        let conn = db::lock(&state.db)?;
        queries::delete_holiday(&conn, id)?
    };

    if deleted {
        tracing::info!(holiday_id = id, "Holiday deleted");
        Ok(Json(serde_json::json!({"ok": true})))
    } else {
        Err(AppError::NotFound(format!("holiday {id}")))
    }
}

#[derive(Serialize)]
pub struct RefreshResponse {
    year: i32,
    region: String,
    cached: bool,
    imported: usize,
}

// POST /api/holidays/refresh?year=
pub async fn refresh_holidays(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<YearQuery>,
) -> Result<Json<RefreshResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let year = query.year_or_current()?;
    let settings = state.engine_settings()?;
    let calendar = HolidayCalendar::new(&state.db, state.holiday_api.as_ref(), &settings);
    let report = calendar.fetch_and_cache_holidays(year).await?;

    Ok(Json(RefreshResponse {
        year,
        region: settings.holiday_region.clone(),
        cached: report.outcome == CacheOutcome::Hit,
        imported: report.imported,
    }))
}
