use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::clock::{self, InvalidInput};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Weekday,
    Weekend,
    Holiday,
}

impl DayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayType::Weekday => "weekday",
            DayType::Weekend => "weekend",
            DayType::Holiday => "holiday",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weekday" => Some(DayType::Weekday),
            "weekend" => Some(DayType::Weekend),
            "holiday" => Some(DayType::Holiday),
            _ => None,
        }
    }

    /// Rule bucket consulted for this day type. Holidays share the weekend rules.
    pub fn rule_bucket(&self) -> DayType {
        match self {
            DayType::Holiday => DayType::Weekend,
            other => *other,
        }
    }

    /// Classifies a date given whether the holiday calendar lists it.
    pub fn classify(date: &NaiveDate, is_holiday: bool) -> Self {
        use chrono::{Datelike, Weekday};

        if is_holiday {
            return DayType::Holiday;
        }
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => DayType::Weekend,
            _ => DayType::Weekday,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeRule {
    pub id: i64,
    pub day_type: DayType,
    #[serde(rename = "rule_name")]
    pub name: String,
    #[serde(rename = "start_time", with = "clock::hhmm")]
    pub start: NaiveTime,
    #[serde(rename = "end_time", with = "clock::hhmm")]
    pub end: NaiveTime,
    #[serde(rename = "is_blocked")]
    pub blocked: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TimeRule {
    /// Half-open containment: `start <= t < end`.
    pub fn contains(&self, t: &NaiveTime) -> bool {
        self.start <= *t && *t < self.end
    }
}

/// Rule fields as submitted by an administrator, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeRuleDraft {
    pub day_type: String,
    pub rule_name: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub is_blocked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTimeRule {
    pub day_type: DayType,
    pub name: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub blocked: bool,
}

impl TimeRuleDraft {
    pub fn validate(&self) -> Result<NewTimeRule, InvalidInput> {
        let day_type = DayType::parse(&self.day_type).ok_or_else(|| {
            InvalidInput::new("day_type must be 'weekday', 'weekend', or 'holiday'")
        })?;
        let name = self.rule_name.trim();
        if name.is_empty() {
            return Err(InvalidInput::new("rule_name is required"));
        }
        let start = clock::parse_time(&self.start_time)
            .map_err(|_| InvalidInput::new("start_time must be in HH:MM format"))?;
        let end = clock::parse_time(&self.end_time)
            .map_err(|_| InvalidInput::new("end_time must be in HH:MM format"))?;
        if end <= start {
            return Err(InvalidInput::new("end_time must be after start_time"));
        }

        Ok(NewTimeRule {
            day_type,
            name: name.to_string(),
            start,
            end,
            blocked: self.is_blocked,
        })
    }
}

/// One entry of a batch rule update, addressed by id.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeRuleUpdate {
    pub id: i64,
    #[serde(flatten)]
    pub rule: TimeRuleDraft,
}
