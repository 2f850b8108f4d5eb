use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::clock::{self, InvalidInput};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HolidaySource {
    Api,
    Admin,
}

impl HolidaySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HolidaySource::Api => "api",
            HolidaySource::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "api" => HolidaySource::Api,
            _ => HolidaySource::Admin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HolidayEntry {
    pub id: i64,
    pub date: NaiveDate,
    pub name: String,
    #[serde(rename = "is_active")]
    pub active: bool,
    pub source: HolidaySource,
    pub created_at: NaiveDateTime,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HolidayDraft {
    pub date: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_by: Option<i64>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewHoliday {
    pub date: NaiveDate,
    pub name: String,
    pub active: bool,
    pub source: HolidaySource,
    pub created_by: Option<i64>,
}

impl HolidayDraft {
    /// Validates an administrator-entered holiday.
    pub fn validate(&self) -> Result<NewHoliday, InvalidInput> {
        if self.date.trim().is_empty() {
            return Err(InvalidInput::new("date is required"));
        }
        let date = clock::parse_date(&self.date)
            .map_err(|_| InvalidInput::new("date must be in YYYY-MM-DD format"))?;
        let name = self.name.trim();
        if name.is_empty() {
            return Err(InvalidInput::new("name is required"));
        }

        Ok(NewHoliday {
            date,
            name: name.to_string(),
            active: self.is_active,
            source: HolidaySource::Admin,
            created_by: self.created_by,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HolidayUpdate {
    pub name: String,
    pub is_active: bool,
}

/// Memoized response of the public-holiday API for one (year, region).
#[derive(Debug, Clone, PartialEq)]
pub struct HolidayCacheEntry {
    pub year: i32,
    pub region: String,
    pub payload: String,
    pub fetched_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl HolidayCacheEntry {
    pub fn is_fresh(&self, now: &NaiveDateTime) -> bool {
        self.expires_at > *now
    }
}

// The `hinweis`/`note` field is informational only and not imported.
#[derive(Debug, Clone, Deserialize)]
struct ApiHoliday {
    #[serde(alias = "date", rename = "datum")]
    date: String,
}

/// Decodes the API body (`name -> {datum, hinweis}`) into (date, name) pairs
/// ordered by date. Entries with an unparseable date are skipped.
pub fn parse_api_payload(body: &str) -> Result<Vec<(NaiveDate, String)>, serde_json::Error> {
    let raw: BTreeMap<String, ApiHoliday> = serde_json::from_str(body)?;

    let mut holidays: Vec<(NaiveDate, String)> = raw
        .into_iter()
        .filter_map(|(name, h)| match clock::parse_date(&h.date) {
            Ok(date) => Some((date, name)),
            Err(_) => {
                tracing::warn!(name = %name, date = %h.date, "skipping holiday with malformed date");
                None
            }
        })
        .collect();
    holidays.sort();
    Ok(holidays)
}
