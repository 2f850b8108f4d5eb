use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::clock;

pub const MORNING_APPROVAL_KEY: &str = "morning_walk_requires_approval";
pub const USE_HOLIDAY_API_KEY: &str = "use_feiertage_api";
pub const HOLIDAY_REGION_KEY: &str = "feiertage_state";
pub const GRANULARITY_KEY: &str = "booking_time_granularity";
pub const HOLIDAY_CACHE_DAYS_KEY: &str = "feiertage_cache_days";

pub const DEFAULT_REGION: &str = "BW";
pub const DEFAULT_GRANULARITY_MINUTES: u32 = 15;
pub const DEFAULT_HOLIDAY_CACHE_DAYS: u32 = 7;
pub const MAX_HOLIDAY_CACHE_DAYS: u32 = 3650;

/// Snapshot of the settings the booking-time engine consumes. Loaded from the
/// settings store per call and passed explicitly to the services.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSettings {
    pub morning_walk_requires_approval: bool,
    pub use_holiday_api: bool,
    pub holiday_region: String,
    pub granularity_minutes: u32,
    pub holiday_cache_days: u32,
    #[serde(with = "clock::hhmm")]
    pub morning_start: NaiveTime,
    #[serde(with = "clock::hhmm")]
    pub morning_end: NaiveTime,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            morning_walk_requires_approval: false,
            use_holiday_api: false,
            holiday_region: DEFAULT_REGION.to_string(),
            granularity_minutes: DEFAULT_GRANULARITY_MINUTES,
            holiday_cache_days: DEFAULT_HOLIDAY_CACHE_DAYS,
            morning_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            morning_end: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
        }
    }
}

impl EngineSettings {
    /// Builds settings from a key lookup. Missing or unparseable values keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Self::default();

        if let Some(v) = lookup(MORNING_APPROVAL_KEY).as_deref().and_then(parse_bool) {
            s.morning_walk_requires_approval = v;
        }
        if let Some(v) = lookup(USE_HOLIDAY_API_KEY).as_deref().and_then(parse_bool) {
            s.use_holiday_api = v;
        }
        if let Some(v) = lookup(HOLIDAY_REGION_KEY) {
            let v = v.trim();
            if !v.is_empty() {
                s.holiday_region = v.to_string();
            }
        }
        if let Some(v) = lookup(GRANULARITY_KEY).and_then(|v| v.trim().parse::<i64>().ok()) {
            s.granularity_minutes = sanitize_granularity(v);
        }
        if let Some(v) = lookup(HOLIDAY_CACHE_DAYS_KEY).and_then(|v| v.trim().parse::<i64>().ok()) {
            if v > 0 {
                s.holiday_cache_days = u32::try_from(v)
                    .unwrap_or(MAX_HOLIDAY_CACHE_DAYS)
                    .min(MAX_HOLIDAY_CACHE_DAYS);
            }
        }
        s
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Slot step in minutes. Must lie in 1..=60 and divide the hour evenly,
/// otherwise the default is used.
pub fn sanitize_granularity(minutes: i64) -> u32 {
    if (1..=60).contains(&minutes) && 60 % minutes == 0 {
        minutes as u32
    } else {
        DEFAULT_GRANULARITY_MINUTES
    }
}

/// Partial settings update submitted by an administrator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub morning_walk_requires_approval: Option<bool>,
    pub use_holiday_api: Option<bool>,
    pub holiday_region: Option<String>,
    pub granularity_minutes: Option<u32>,
    pub holiday_cache_days: Option<u32>,
}

impl SettingsUpdate {
    /// Key/value pairs to persist. The cache TTL is clamped to
    /// `1..=MAX_HOLIDAY_CACHE_DAYS`; other values are written as given and
    /// readers apply the fallback rules.
    pub fn into_pairs(self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![];
        if let Some(v) = self.morning_walk_requires_approval {
            pairs.push((MORNING_APPROVAL_KEY, v.to_string()));
        }
        if let Some(v) = self.use_holiday_api {
            pairs.push((USE_HOLIDAY_API_KEY, v.to_string()));
        }
        if let Some(v) = self.holiday_region {
            pairs.push((HOLIDAY_REGION_KEY, v.trim().to_string()));
        }
        if let Some(v) = self.granularity_minutes {
            pairs.push((GRANULARITY_KEY, v.to_string()));
        }
        if let Some(v) = self.holiday_cache_days {
            pairs.push((HOLIDAY_CACHE_DAYS_KEY, v.clamp(1, MAX_HOLIDAY_CACHE_DAYS).to_string()));
        }
        pairs
    }
}
