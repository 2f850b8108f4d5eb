use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use super::check_auth;
use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{TimeRule, TimeRuleDraft, TimeRuleUpdate};
use crate::services::scheduling::{DaySlots, RuleEngine};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

impl DateQuery {
    fn required(&self) -> Result<&str, AppError> {
        self.date
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("date is required".to_string()))
    }
}

// GET /api/booking-times/available?date=
pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<DaySlots>, AppError> {
    let date = query.required()?;
    let settings = state.engine_settings()?;
    let engine = RuleEngine::new(&state.db, state.holiday_api.as_ref(), &settings);

    Ok(Json(engine.available_slots(date).await?))
}

// GET /api/booking-times/rules-for-date?date=
pub async fn rules_for_date(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<TimeRule>>, AppError> {
    let date = query.required()?;
    let settings = state.engine_settings()?;
    let engine = RuleEngine::new(&state.db, state.holiday_api.as_ref(), &settings);

    Ok(Json(engine.rules_for_date(date).await?))
}

// GET /api/booking-times/rules
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<BTreeMap<&'static str, Vec<TimeRule>>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let rules = {
        let conn = db::lock(&state.db)?;
        queries::get_all_rules(&conn)?
    };

    let mut grouped: BTreeMap<&'static str, Vec<TimeRule>> = BTreeMap::new();
    for rule in rules {
        grouped.entry(rule.day_type.as_str()).or_default().push(rule);
    }
    Ok(Json(grouped))
}

// POST /api/booking-times/rules
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<TimeRuleDraft>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let rule = draft.validate()?;

    let id = {
        let conn = db::lock(&state.db)?;
        if queries::find_rule_by_name(&conn, rule.day_type, &rule.name)?.is_some() {
            return Err(AppError::BadRequest(format!(
                "a {} rule named '{}' already exists",
                rule.day_type.as_str(),
                rule.name
            )));
        }
        queries::create_rule(&conn, &rule)?
    };

    tracing::info!(rule_id = id, day_type = rule.day_type.as_str(), name = %rule.name, "Time rule created");
    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

// PUT /api/booking-times/rules
pub async fn update_rules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(updates): Json<Vec<TimeRuleUpdate>>,
) -> Result<Json<Vec<TimeRule>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    // Nothing is written unless every entry is valid.
    let validated = updates
        .iter()
        .map(|u| u.rule.validate().map(|rule| (u.id, rule)))
        .collect::<Result<Vec<_>, _>>()?;

    let conn = db::lock(&state.db)?;
    let tx = conn.unchecked_transaction().map_err(anyhow::Error::from)?;
    for (id, rule) in &validated {
        if let Some(other) = queries::find_rule_by_name(&tx, rule.day_type, &rule.name)? {
            if other != *id {
                return Err(AppError::BadRequest(format!(
                    "a {} rule named '{}' already exists",
                    rule.day_type.as_str(),
                    rule.name
                )));
            }
        }
        if !queries::update_rule(&tx, *id, rule)? {
            return Err(AppError::NotFound(format!("rule {id}")));
        }
    }
    let mut updated = Vec::with_capacity(validated.len());
    for (id, _) in &validated {
        if let Some(rule) = queries::get_rule(&tx, *id)? {
            updated.push(rule);
        }
    }
    tx.commit().map_err(anyhow::Error::from)?;

    tracing::info!(count = updated.len(), "Time rules updated");
    Ok(Json(updated))
}

// DELETE /api/booking-times/rules/:id
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let deleted = {
        let conn = db::lock(&state.db)?;
        queries::delete_rule(&conn, id)?
    };

    if deleted {
        tracing::info!(rule_id = id, "Time rule deleted");
        Ok(Json(serde_json::json!({"ok": true})))
    } else {
        Err(AppError::NotFound(format!("rule {id}")))
    }
}
