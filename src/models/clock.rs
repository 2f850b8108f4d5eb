use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Malformed date, time, or record field supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidInput(pub String);

impl InvalidInput {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Parses `YYYY-MM-DD`. Unpadded or otherwise loose forms are rejected.
pub fn parse_date(s: &str) -> Result<NaiveDate, InvalidInput> {
    let b = s.as_bytes();
    let shape_ok = b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit());
    if !shape_ok {
        return Err(InvalidInput(format!("invalid date format: {s} (expected YYYY-MM-DD)")));
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| InvalidInput(format!("invalid date: {s}")))
}

/// Parses a 24h `HH:MM` wall-clock time.
pub fn parse_time(s: &str) -> Result<NaiveTime, InvalidInput> {
    let b = s.as_bytes();
    let shape_ok = b.len() == 5
        && b[2] == b':'
        && b.iter().enumerate().all(|(i, c)| i == 2 || c.is_ascii_digit());
    if !shape_ok {
        return Err(InvalidInput(format!("invalid time format: {s} (expected HH:MM)")));
    }
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .map_err(|_| InvalidInput(format!("time out of range: {s}")))
}

pub fn format_time(t: &NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid stored timestamp {s}: {e}"))
}

pub fn minute_of_day(t: &NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

pub fn from_minute_of_day(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// Serde adapter for `HH:MM` wall-clock fields.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_time(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }
}
