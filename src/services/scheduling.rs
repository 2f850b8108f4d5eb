use std::collections::BTreeSet;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{self, queries};
use crate::models::clock::{self, InvalidInput};
use crate::models::settings::sanitize_granularity;
use crate::models::{DayType, EngineSettings, TimeRule};
use crate::services::holidays::{HolidayApi, HolidayCalendar};

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("{0}")]
    InvalidInput(#[from] InvalidInput),

    #[error("time is outside the allowed booking windows")]
    OutsideWindows,

    #[error("time is blocked: {rule_name} ({}-{})", .start.format("%H:%M"), .end.format("%H:%M"))]
    BlockedWindow {
        rule_name: String,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("dog {dog_id} is already booked at that time")]
    AlreadyBooked { dog_id: i64 },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Checks `time` against a day's rules (ordered by start, then id).
/// A matching blocked rule always wins over matching allowed rules.
pub fn evaluate_rules(rules: &[TimeRule], time: &NaiveTime) -> Result<(), SchedulingError> {
    let mut inside_allowed = false;

    for rule in rules.iter().filter(|r| r.contains(time)) {
        if rule.blocked {
            return Err(SchedulingError::BlockedWindow {
                rule_name: rule.name.clone(),
                start: rule.start,
                end: rule.end,
            });
        }
        inside_allowed = true;
    }

    if inside_allowed {
        Ok(())
    } else {
        Err(SchedulingError::OutsideWindows)
    }
}

/// Enumerates bookable start times: every `granularity` minutes from each
/// allowed rule's start while strictly before its end, skipping times a
/// blocked rule covers. Sorted and de-duplicated.
pub fn generate_slots(rules: &[TimeRule], granularity_minutes: u32) -> Vec<NaiveTime> {
    let step = sanitize_granularity(i64::from(granularity_minutes));
    let mut slots = BTreeSet::new();

    for rule in rules.iter().filter(|r| !r.blocked) {
        let end = clock::minute_of_day(&rule.end);
        let mut minute = clock::minute_of_day(&rule.start);
        while minute < end {
            if let Some(t) = clock::from_minute_of_day(minute) {
                slots.insert(t);
            }
            minute += step;
        }
    }

    slots
        .into_iter()
        .filter(|t| evaluate_rules(rules, t).is_ok())
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub day_type: DayType,
    pub slots: Vec<String>,
}

/// Booking-time rule engine. Reads rules, holidays and settings fresh on
/// every call.
pub struct RuleEngine<'a> {
    db: &'a Mutex<Connection>,
    calendar: HolidayCalendar<'a>,
    settings: &'a EngineSettings,
}

impl<'a> RuleEngine<'a> {
    pub fn new(db: &'a Mutex<Connection>, api: &'a dyn HolidayApi, settings: &'a EngineSettings) -> Self {
        Self {
            db,
            calendar: HolidayCalendar::new(db, api, settings),
            settings,
        }
    }

    pub async fn day_type(&self, date: &NaiveDate) -> anyhow::Result<DayType> {
        let is_holiday = self.calendar.is_holiday(date).await?;
        Ok(DayType::classify(date, is_holiday))
    }

    async fn rules_for(&self, date: &NaiveDate) -> anyhow::Result<(DayType, Vec<TimeRule>)> {
        let day_type = self.day_type(date).await?;
        let conn = db::lock(self.db)?;
        let rules = queries::get_rules_by_day_type(&conn, day_type.rule_bucket())?;
        Ok((day_type, rules))
    }

    pub async fn validate_booking_time(&self, date: &str, time: &str) -> Result<(), SchedulingError> {
        let date = clock::parse_date(date)?;
        let time = clock::parse_time(time)?;
        self.check_time(&date, &time).await.map(|_| ())
    }

    /// Validates a parsed date/time, returning the resolved day type.
    pub async fn check_time(&self, date: &NaiveDate, time: &NaiveTime) -> Result<DayType, SchedulingError> {
        let (day_type, rules) = self.rules_for(date).await?;
        evaluate_rules(&rules, time)?;
        Ok(day_type)
    }

    pub async fn available_slots(&self, date: &str) -> Result<DaySlots, SchedulingError> {
        let date = clock::parse_date(date)?;
        let (day_type, rules) = self.rules_for(&date).await?;
        let slots = generate_slots(&rules, self.settings.granularity_minutes)
            .iter()
            .map(clock::format_time)
            .collect();

        Ok(DaySlots {
            date,
            day_type,
            slots,
        })
    }

    pub async fn rules_for_date(&self, date: &str) -> Result<Vec<TimeRule>, SchedulingError> {
        let date = clock::parse_date(date)?;
        let (_, rules) = self.rules_for(&date).await?;
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::models::{HolidaySource, NewHoliday, NewTimeRule};

    struct OfflineApi;

    #[async_trait]
    impl HolidayApi for OfflineApi {
        async fn fetch_year(&self, _year: i32, _region: &str) -> anyhow::Result<String> {
            anyhow::bail!("offline")
        }
    }

    fn t(s: &str) -> NaiveTime {
        clock::parse_time(s).unwrap()
    }

    fn rule(id: i64, name: &str, start: &str, end: &str, blocked: bool) -> TimeRule {
        let ts = clock::parse_date("2025-01-01").unwrap().and_hms_opt(0, 0, 0).unwrap();
        TimeRule {
            id,
            day_type: DayType::Weekday,
            name: name.to_string(),
            start: t(start),
            end: t(end),
            blocked,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn shelter_weekday() -> Vec<TimeRule> {
        vec![
            rule(1, "Morgen", "09:00", "12:00", false),
            rule(2, "Mittagspause", "13:00", "14:00", true),
            rule(3, "Nachmittag", "14:00", "16:30", false),
        ]
    }

    /// Replaces the seeded rules with the given ones.
    fn setup_db(rules: &[(DayType, &str, &str, &str, bool)]) -> Mutex<Connection> {
        let conn = db::init_db(":memory:").unwrap();
        conn.execute("DELETE FROM booking_time_rules", []).unwrap();
        for (day_type, name, start, end, blocked) in rules {
            queries::create_rule(
                &conn,
                &NewTimeRule {
                    day_type: *day_type,
                    name: name.to_string(),
                    start: t(start),
                    end: t(end),
                    blocked: *blocked,
                },
            )
            .unwrap();
        }
        Mutex::new(conn)
    }

    fn shelter_db() -> Mutex<Connection> {
        setup_db(&[
            (DayType::Weekday, "Morgen", "09:00", "12:00", false),
            (DayType::Weekday, "Mittagspause", "13:00", "14:00", true),
            (DayType::Weekday, "Nachmittag", "14:00", "16:30", false),
            (DayType::Weekend, "Wochenende", "10:00", "11:00", false),
        ])
    }

    #[test]
    fn test_evaluate_allowed_blocked_outside() {
        let rules = shelter_weekday();
        assert!(evaluate_rules(&rules, &t("09:00")).is_ok());
        assert!(evaluate_rules(&rules, &t("15:00")).is_ok());
        assert!(matches!(
            evaluate_rules(&rules, &t("13:30")),
            Err(SchedulingError::BlockedWindow { ref rule_name, .. }) if rule_name == "Mittagspause"
        ));
        assert!(matches!(evaluate_rules(&rules, &t("12:00")), Err(SchedulingError::OutsideWindows)));
        assert!(matches!(evaluate_rules(&rules, &t("16:30")), Err(SchedulingError::OutsideWindows)));
        assert!(matches!(evaluate_rules(&rules, &t("08:59")), Err(SchedulingError::OutsideWindows)));
    }

    #[test]
    fn test_blocked_wins_regardless_of_order() {
        let allowed = rule(1, "Lang", "09:00", "17:00", false);
        let blocked = rule(2, "Fütterung", "12:00", "13:00", true);

        let forward = vec![allowed.clone(), blocked.clone()];
        let backward = vec![blocked, allowed];
        for rules in [forward, backward] {
            assert!(matches!(
                evaluate_rules(&rules, &t("12:15")),
                Err(SchedulingError::BlockedWindow { .. })
            ));
            assert!(evaluate_rules(&rules, &t("11:45")).is_ok());
        }
    }

    #[test]
    fn test_blocked_error_message_names_window() {
        let err = evaluate_rules(&shelter_weekday(), &t("13:30")).unwrap_err();
        assert_eq!(err.to_string(), "time is blocked: Mittagspause (13:00-14:00)");
    }

    #[test]
    fn test_generate_slots_half_open() {
        let slots: Vec<String> = generate_slots(&shelter_weekday(), 15)
            .iter()
            .map(clock::format_time)
            .collect();

        assert_eq!(slots.len(), 22);
        assert_eq!(slots[0], "09:00");
        assert_eq!(slots[11], "11:45");
        assert_eq!(slots[12], "14:00");
        assert_eq!(slots[21], "16:15");
        assert!(!slots.contains(&"12:00".to_string()));
        assert!(!slots.contains(&"16:30".to_string()));
        assert!(!slots.contains(&"13:00".to_string()));
    }

    #[test]
    fn test_generate_slots_dedups_and_skips_blocked_overlap() {
        let rules = vec![
            rule(1, "A", "09:00", "10:00", false),
            rule(2, "B", "09:30", "10:30", false),
            rule(3, "Sperre", "09:45", "10:00", true),
        ];
        let slots: Vec<String> = generate_slots(&rules, 15).iter().map(clock::format_time).collect();
        assert_eq!(slots, vec!["09:00", "09:15", "09:30", "10:00", "10:15"]);
    }

    #[test]
    fn test_generate_slots_bad_granularity_uses_default() {
        let rules = vec![rule(1, "A", "09:00", "10:00", false)];
        assert_eq!(generate_slots(&rules, 0).len(), 4);
        assert_eq!(generate_slots(&rules, 7).len(), 4);
        assert_eq!(generate_slots(&rules, 30).len(), 2);
    }

    #[test]
    fn test_slots_always_validate() {
        let rules = vec![
            rule(1, "A", "08:10", "12:00", false),
            rule(2, "X", "10:00", "10:40", true),
            rule(3, "B", "10:20", "13:05", false),
            rule(4, "Y", "12:50", "13:00", true),
        ];
        for granularity in [1, 5, 10, 15, 20, 30, 60] {
            for slot in generate_slots(&rules, granularity) {
                assert!(evaluate_rules(&rules, &slot).is_ok(), "slot {slot} rejected");
            }
        }
    }

    #[tokio::test]
    async fn test_validate_booking_time_weekday_scenario() {
        let db = shelter_db();
        let settings = EngineSettings::default();
        let engine = RuleEngine::new(&db, &OfflineApi, &settings);

        // 2025-01-27 is a Monday
        let blocked = engine.validate_booking_time("2025-01-27", "13:30").await;
        assert!(matches!(blocked, Err(SchedulingError::BlockedWindow { .. })));
        assert!(engine.validate_booking_time("2025-01-27", "15:00").await.is_ok());
        assert!(matches!(
            engine.validate_booking_time("2025-01-27", "19:00").await,
            Err(SchedulingError::OutsideWindows)
        ));
    }

    #[tokio::test]
    async fn test_validate_booking_time_rejects_malformed_input() {
        let db = shelter_db();
        let settings = EngineSettings::default();
        let engine = RuleEngine::new(&db, &OfflineApi, &settings);

        for (date, time) in [("2025-1-27", "10:00"), ("2025-01-27", "10"), ("tomorrow", "10:00")] {
            assert!(matches!(
                engine.validate_booking_time(date, time).await,
                Err(SchedulingError::InvalidInput(_))
            ));
        }
        assert!(matches!(
            engine.available_slots("27.01.2025").await,
            Err(SchedulingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_available_slots_weekday_scenario() {
        let db = shelter_db();
        let settings = EngineSettings::default();
        let engine = RuleEngine::new(&db, &OfflineApi, &settings);

        let day = engine.available_slots("2025-01-27").await.unwrap();
        assert_eq!(day.day_type, DayType::Weekday);
        assert_eq!(day.slots.len(), 22);
        assert_eq!(day.slots.first().map(String::as_str), Some("09:00"));
        assert_eq!(day.slots.last().map(String::as_str), Some("16:15"));
    }

    #[tokio::test]
    async fn test_holiday_monday_uses_weekend_rules() {
        let db = shelter_db();
        queries::create_holiday(
            &db.lock().unwrap(),
            &NewHoliday {
                date: clock::parse_date("2025-01-27").unwrap(),
                name: "Sondertag".to_string(),
                active: true,
                source: HolidaySource::Admin,
                created_by: None,
            },
        )
        .unwrap();

        let settings = EngineSettings::default();
        let engine = RuleEngine::new(&db, &OfflineApi, &settings);
        let date = clock::parse_date("2025-01-27").unwrap();

        assert_eq!(engine.day_type(&date).await.unwrap(), DayType::Holiday);
        let rules = engine.rules_for_date("2025-01-27").await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "Wochenende");

        assert!(matches!(
            engine.validate_booking_time("2025-01-27", "15:00").await,
            Err(SchedulingError::OutsideWindows)
        ));
        assert!(engine.validate_booking_time("2025-01-27", "10:30").await.is_ok());

        let day = engine.available_slots("2025-01-27").await.unwrap();
        assert_eq!(day.day_type, DayType::Holiday);
        assert_eq!(day.slots, vec!["10:00", "10:15", "10:30", "10:45"]);
    }

    #[tokio::test]
    async fn test_weekend_date_uses_weekend_rules() {
        let db = shelter_db();
        let settings = EngineSettings {
            granularity_minutes: 30,
            ..EngineSettings::default()
        };
        let engine = RuleEngine::new(&db, &OfflineApi, &settings);

        // 2025-02-01 is a Saturday
        let day = engine.available_slots("2025-02-01").await.unwrap();
        assert_eq!(day.day_type, DayType::Weekend);
        assert_eq!(day.slots, vec!["10:00", "10:30"]);
    }

    #[tokio::test]
    async fn test_rule_edits_visible_on_next_call() {
        let db = shelter_db();
        let settings = EngineSettings::default();
        let engine = RuleEngine::new(&db, &OfflineApi, &settings);

        assert!(engine.validate_booking_time("2025-01-27", "13:30").await.is_err());
        {
            let conn = db.lock().unwrap();
            let id = queries::find_rule_by_name(&conn, DayType::Weekday, "Mittagspause")
                .unwrap()
                .unwrap();
            queries::delete_rule(&conn, id).unwrap();
        }
        assert!(matches!(
            engine.validate_booking_time("2025-01-27", "13:30").await,
            Err(SchedulingError::OutsideWindows)
        ));
    }
}
