pub mod feiertage;

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;

use crate::db::{self, queries};
use crate::models::holiday::parse_api_payload;
use crate::models::{EngineSettings, HolidayCacheEntry, HolidayEntry};

/// Source of truth for public holidays: one GET per (year, region) returning
/// the raw response body.
#[async_trait]
pub trait HolidayApi: Send + Sync {
    async fn fetch_year(&self, year: i32, region: &str) -> anyhow::Result<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum HolidayError {
    #[error("holiday fetch failed: {0}")]
    FetchFailed(String),

    #[error("holiday payload could not be parsed: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Fetched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub outcome: CacheOutcome,
    pub imported: usize,
}

/// Outcome of a holiday check. A failed import is reported here but never
/// fails the check itself.
#[derive(Debug)]
pub struct HolidayLookup {
    pub is_holiday: bool,
    pub fetch_attempted: bool,
    pub fetch_error: Option<HolidayError>,
}

/// Holiday calendar over the holiday store, refreshed best-effort from the
/// external API through the persisted response cache.
pub struct HolidayCalendar<'a> {
    db: &'a Mutex<Connection>,
    api: &'a dyn HolidayApi,
    settings: &'a EngineSettings,
}

impl<'a> HolidayCalendar<'a> {
    pub fn new(db: &'a Mutex<Connection>, api: &'a dyn HolidayApi, settings: &'a EngineSettings) -> Self {
        Self { db, api, settings }
    }

    pub async fn is_holiday(&self, date: &NaiveDate) -> anyhow::Result<bool> {
        Ok(self.lookup(date).await?.is_holiday)
    }

    pub async fn lookup(&self, date: &NaiveDate) -> anyhow::Result<HolidayLookup> {
        let (fetch_attempted, fetch_error) = self.refresh_best_effort(date.year()).await;

        let conn = db::lock(self.db)?;
        let is_holiday = queries::is_holiday(&conn, date)?;

        Ok(HolidayLookup {
            is_holiday,
            fetch_attempted,
            fetch_error,
        })
    }

    /// Active holidays of `year`, importing from the API first when enabled.
    pub async fn holidays_for_year(&self, year: i32) -> anyhow::Result<Vec<HolidayEntry>> {
        self.refresh_best_effort(year).await;

        let conn = db::lock(self.db)?;
        queries::get_holidays_by_year(&conn, year)
    }

    pub async fn fetch_and_cache_holidays(&self, year: i32) -> Result<ImportReport, HolidayError> {
        self.fetch_and_cache_holidays_at(year, Utc::now().naive_utc()).await
    }

    /// Cache protocol: a fresh cache entry is re-imported without a remote
    /// call; otherwise the API is queried and, on success, the entry for
    /// (year, region) is replaced before importing. A failed fetch leaves the
    /// existing entry untouched.
    pub async fn fetch_and_cache_holidays_at(
        &self,
        year: i32,
        now: NaiveDateTime,
    ) -> Result<ImportReport, HolidayError> {
        let region = self.settings.holiday_region.as_str();

        let cached = {
            let conn = db::lock(self.db)?;
            queries::get_holiday_cache(&conn, year, region)?
        };

        if let Some(entry) = cached.filter(|e| e.is_fresh(&now)) {
            match parse_api_payload(&entry.payload) {
                Ok(holidays) => {
                    let conn = db::lock(self.db)?;
                    let imported = queries::import_api_holidays(&conn, &holidays)?;
                    tracing::debug!(year, region, imported, "holiday cache hit");
                    return Ok(ImportReport {
                        outcome: CacheOutcome::Hit,
                        imported,
                    });
                }
                Err(e) => {
                    tracing::warn!(year, region, error = %e, "cached holiday payload unreadable, refetching");
                }
            }
        }

        tracing::info!(year, region, "fetching holidays from API");
        let body = self
            .api
            .fetch_year(year, region)
            .await
            .map_err(|e| HolidayError::FetchFailed(format!("{e:#}")))?;
        let holidays = parse_api_payload(&body)?;

        let entry = HolidayCacheEntry {
            year,
            region: region.to_string(),
            payload: body,
            fetched_at: now,
            expires_at: cache_expiry(now, self.settings.holiday_cache_days),
        };

        let conn = db::lock(self.db)?;
        if let Err(e) = queries::put_holiday_cache(&conn, &entry) {
            tracing::warn!(year, region, error = %e, "failed to cache holiday response");
        }
        let imported = queries::import_api_holidays(&conn, &holidays)?;
        tracing::info!(year, region, imported, "imported holidays from API");

        Ok(ImportReport {
            outcome: CacheOutcome::Fetched,
            imported,
        })
    }

    async fn refresh_best_effort(&self, year: i32) -> (bool, Option<HolidayError>) {
        if !self.settings.use_holiday_api {
            return (false, None);
        }
        match self.fetch_and_cache_holidays(year).await {
            Ok(_) => (true, None),
            Err(e) => {
                tracing::warn!(year, error = %e, "holiday import failed, using stored holidays");
                (true, Some(e))
            }
        }
    }
}

/// `now + days`, saturating instead of overflowing.
fn cache_expiry(now: NaiveDateTime, days: u32) -> NaiveDateTime {
    Duration::try_days(i64::from(days))
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(NaiveDateTime::MAX)
}
