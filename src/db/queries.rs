use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::clock::{self, DATE_FORMAT};
use crate::models::{
    ApprovalStatus, Booking, BookingStatus, DayType, EngineSettings, HolidayCacheEntry,
    HolidayEntry, HolidaySource, NewHoliday, NewTimeRule, TimeRule,
};

fn now_str() -> String {
    clock::format_timestamp(&Utc::now().naive_utc())
}

fn date_str(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ── Settings ──

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO system_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now_str()],
    )?;
    Ok(())
}

pub fn load_engine_settings(conn: &Connection) -> anyhow::Result<EngineSettings> {
    let mut stmt = conn.prepare("SELECT key, value FROM system_settings")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut values = HashMap::new();
    for row in rows {
        let (key, value) = row?;
        values.insert(key, value);
    }
    Ok(EngineSettings::from_lookup(|key| values.get(key).cloned()))
}

// ── Booking Time Rules ──

const RULE_COLUMNS: &str =
    "id, day_type, rule_name, start_time, end_time, is_blocked, created_at, updated_at";

/// Rules for one day type, ordered by start time with id as tie-break.
pub fn get_rules_by_day_type(conn: &Connection, day_type: DayType) -> anyhow::Result<Vec<TimeRule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RULE_COLUMNS} FROM booking_time_rules
         WHERE day_type = ?1 ORDER BY start_time ASC, id ASC"
    ))?;

    let rows = stmt.query_map(params![day_type.as_str()], |row| Ok(parse_rule_row(row)))?;

    let mut rules = vec![];
    for row in rows {
        rules.push(row??);
    }
    Ok(rules)
}

pub fn get_all_rules(conn: &Connection) -> anyhow::Result<Vec<TimeRule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RULE_COLUMNS} FROM booking_time_rules
         ORDER BY day_type ASC, start_time ASC, id ASC"
    ))?;

    let rows = stmt.query_map([], |row| Ok(parse_rule_row(row)))?;

    let mut rules = vec![];
    for row in rows {
        rules.push(row??);
    }
    Ok(rules)
}

pub fn get_rule(conn: &Connection, id: i64) -> anyhow::Result<Option<TimeRule>> {
    let result = conn
        .query_row(
            &format!("SELECT {RULE_COLUMNS} FROM booking_time_rules WHERE id = ?1"),
            params![id],
            |row| Ok(parse_rule_row(row)),
        )
        .optional()?;

    result.transpose()
}

/// Id of the rule holding `(day_type, name)`, if any.
pub fn find_rule_by_name(conn: &Connection, day_type: DayType, name: &str) -> anyhow::Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM booking_time_rules WHERE day_type = ?1 AND rule_name = ?2",
            params![day_type.as_str(), name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn create_rule(conn: &Connection, rule: &NewTimeRule) -> anyhow::Result<i64> {
    let now = now_str();
    conn.execute(
        "INSERT INTO booking_time_rules (day_type, rule_name, start_time, end_time, is_blocked, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            rule.day_type.as_str(),
            rule.name,
            clock::format_time(&rule.start),
            clock::format_time(&rule.end),
            rule.blocked as i32,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_rule(conn: &Connection, id: i64, rule: &NewTimeRule) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE booking_time_rules
         SET day_type = ?1, rule_name = ?2, start_time = ?3, end_time = ?4, is_blocked = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            rule.day_type.as_str(),
            rule.name,
            clock::format_time(&rule.start),
            clock::format_time(&rule.end),
            rule.blocked as i32,
            now_str(),
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn delete_rule(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM booking_time_rules WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

fn parse_rule_row(row: &rusqlite::Row) -> anyhow::Result<TimeRule> {
    let id: i64 = row.get(0)?;
    let day_type_str: String = row.get(1)?;
    let name: String = row.get(2)?;
    let start_str: String = row.get(3)?;
    let end_str: String = row.get(4)?;
    let blocked: bool = row.get::<_, i32>(5)? != 0;
    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;

    let day_type = DayType::parse(&day_type_str)
        .ok_or_else(|| anyhow::anyhow!("rule {id} has unknown day_type {day_type_str}"))?;
    let start = clock::parse_time(&start_str)?;
    let end = clock::parse_time(&end_str)?;

    Ok(TimeRule {
        id,
        day_type,
        name,
        start,
        end,
        blocked,
        created_at: clock::parse_timestamp(&created_at_str)?,
        updated_at: clock::parse_timestamp(&updated_at_str)?,
    })
}

// ── Holidays ──

const HOLIDAY_COLUMNS: &str = "id, date, name, is_active, source, created_at, created_by";

pub fn is_holiday(conn: &Connection, date: &NaiveDate) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM holidays WHERE date = ?1 AND is_active = 1",
        params![date_str(date)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_holidays_by_year(conn: &Connection, year: i32) -> anyhow::Result<Vec<HolidayEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HOLIDAY_COLUMNS} FROM holidays
         WHERE is_active = 1 AND date LIKE ?1 ORDER BY date ASC"
    ))?;

    let rows = stmt.query_map(params![format!("{year:04}-%")], |row| Ok(parse_holiday_row(row)))?;

    let mut holidays = vec![];
    for row in rows {
        holidays.push(row??);
    }
    Ok(holidays)
}

pub fn get_holiday(conn: &Connection, id: i64) -> anyhow::Result<Option<HolidayEntry>> {
    let result = conn
        .query_row(
            &format!("SELECT {HOLIDAY_COLUMNS} FROM holidays WHERE id = ?1"),
            params![id],
            |row| Ok(parse_holiday_row(row)),
        )
        .optional()?;

    result.transpose()
}

pub fn holiday_exists_on(conn: &Connection, date: &NaiveDate) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM holidays WHERE date = ?1",
        params![date_str(date)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn create_holiday(conn: &Connection, holiday: &NewHoliday) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO holidays (date, name, is_active, source, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            date_str(&holiday.date),
            holiday.name,
            holiday.active as i32,
            holiday.source.as_str(),
            now_str(),
            holiday.created_by,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_holiday(conn: &Connection, id: i64, name: &str, active: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE holidays SET name = ?1, is_active = ?2 WHERE id = ?3",
        params![name, active as i32, id],
    )?;
    Ok(count > 0)
}

pub fn delete_holiday(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM holidays WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Upserts API-sourced holidays in one transaction. An existing API row only
/// has its name refreshed (its active flag is left to administrators);
/// administrator rows are never touched. Returns the number of rows written.
pub fn import_api_holidays(conn: &Connection, holidays: &[(NaiveDate, String)]) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let now = now_str();
    let mut written = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO holidays (date, name, is_active, source, created_at)
             VALUES (?1, ?2, 1, 'api', ?3)
             ON CONFLICT(date) DO UPDATE SET name = excluded.name
             WHERE holidays.source = 'api'",
        )?;
        for (date, name) in holidays {
            written += stmt.execute(params![date_str(date), name, now])?;
        }
    }
    tx.commit()?;
    Ok(written)
}

fn parse_holiday_row(row: &rusqlite::Row) -> anyhow::Result<HolidayEntry> {
    let id: i64 = row.get(0)?;
    let date_s: String = row.get(1)?;
    let name: String = row.get(2)?;
    let active: bool = row.get::<_, i32>(3)? != 0;
    let source: String = row.get(4)?;
    let created_at_str: String = row.get(5)?;
    let created_by: Option<i64> = row.get(6)?;

    Ok(HolidayEntry {
        id,
        date: clock::parse_date(&date_s)?,
        name,
        active,
        source: HolidaySource::parse(&source),
        created_at: clock::parse_timestamp(&created_at_str)?,
        created_by,
    })
}

// ── Holiday API Cache ──

pub fn get_holiday_cache(
    conn: &Connection,
    year: i32,
    region: &str,
) -> anyhow::Result<Option<HolidayCacheEntry>> {
    let row = conn
        .query_row(
            "SELECT year, region, payload, fetched_at, expires_at FROM holiday_cache
             WHERE year = ?1 AND region = ?2",
            params![year, region],
            |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((year, region, payload, fetched_at, expires_at)) => Ok(Some(HolidayCacheEntry {
            year,
            region,
            payload,
            fetched_at: clock::parse_timestamp(&fetched_at)?,
            expires_at: clock::parse_timestamp(&expires_at)?,
        })),
        None => Ok(None),
    }
}

/// Stores the cache entry, replacing any prior entry for the same key.
pub fn put_holiday_cache(conn: &Connection, entry: &HolidayCacheEntry) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO holiday_cache (year, region, payload, fetched_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(year, region) DO UPDATE SET
           payload = excluded.payload,
           fetched_at = excluded.fetched_at,
           expires_at = excluded.expires_at",
        params![
            entry.year,
            entry.region,
            entry.payload,
            clock::format_timestamp(&entry.fetched_at),
            clock::format_timestamp(&entry.expires_at),
        ],
    )?;
    Ok(())
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, user_id, dog_id, date, scheduled_time, status, user_notes, \
     requires_approval, approval_status, approved_by, approved_at, rejection_reason, created_at, updated_at";

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            booking.id,
            booking.user_id,
            booking.dog_id,
            date_str(&booking.date),
            clock::format_time(&booking.scheduled_time),
            booking.status.as_str(),
            booking.user_notes,
            booking.requires_approval as i32,
            booking.approval_status.as_str(),
            booking.approved_by,
            booking.approved_at.as_ref().map(clock::format_timestamp),
            booking.rejection_reason,
            clock::format_timestamp(&booking.created_at),
            clock::format_timestamp(&booking.updated_at),
        ],
    )?;
    Ok(())
}

/// Whether the dog already has a non-cancelled booking at that date and time.
pub fn dog_is_booked(
    conn: &Connection,
    dog_id: i64,
    date: &NaiveDate,
    time: &NaiveTime,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE dog_id = ?1 AND date = ?2 AND scheduled_time = ?3 AND status != 'cancelled'",
        params![dog_id, date_str(date), clock::format_time(time)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    result.transpose()
}

pub fn get_bookings(
    conn: &Connection,
    approval_filter: Option<ApprovalStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match approval_filter {
        Some(status) => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE approval_status = ?1
                 ORDER BY date ASC, scheduled_time ASC LIMIT ?2"
            ),
            vec![
                Box::new(status.as_str()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 ORDER BY date ASC, scheduled_time ASC LIMIT ?1"
            ),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// `pending -> approved` as one conditional update. Returns false when the
/// booking is missing or no longer pending.
pub fn approve_pending_booking(
    conn: &Connection,
    id: &str,
    admin_id: i64,
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let at = clock::format_timestamp(at);
    let count = conn.execute(
        "UPDATE bookings
         SET approval_status = 'approved', approved_by = ?1, approved_at = ?2, updated_at = ?2
         WHERE id = ?3 AND approval_status = 'pending'",
        params![admin_id, at, id],
    )?;
    Ok(count > 0)
}

/// `pending -> rejected` as one conditional update; also cancels the booking.
pub fn reject_pending_booking(
    conn: &Connection,
    id: &str,
    admin_id: i64,
    at: &NaiveDateTime,
    reason: &str,
) -> anyhow::Result<bool> {
    let at = clock::format_timestamp(at);
    let count = conn.execute(
        "UPDATE bookings
         SET approval_status = 'rejected', approved_by = ?1, approved_at = ?2,
             rejection_reason = ?3, status = 'cancelled', updated_at = ?2
         WHERE id = ?4 AND approval_status = 'pending'",
        params![admin_id, at, reason, id],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let id: String = row.get(0)?;
    let user_id: i64 = row.get(1)?;
    let dog_id: i64 = row.get(2)?;
    let date_s: String = row.get(3)?;
    let time_s: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let user_notes: Option<String> = row.get(6)?;
    let requires_approval: bool = row.get::<_, i32>(7)? != 0;
    let approval_str: String = row.get(8)?;
    let approved_by: Option<i64> = row.get(9)?;
    let approved_at_str: Option<String> = row.get(10)?;
    let rejection_reason: Option<String> = row.get(11)?;
    let created_at_str: String = row.get(12)?;
    let updated_at_str: String = row.get(13)?;

    let approval_status = ApprovalStatus::parse(&approval_str)
        .ok_or_else(|| anyhow::anyhow!("booking {id} has unknown approval_status {approval_str}"))?;
    let approved_at = approved_at_str
        .as_deref()
        .map(clock::parse_timestamp)
        .transpose()?;

    Ok(Booking {
        date: clock::parse_date(&date_s)?,
        scheduled_time: clock::parse_time(&time_s)?,
        status: BookingStatus::parse(&status_str),
        user_notes,
        requires_approval,
        approval_status,
        approved_by,
        approved_at,
        rejection_reason,
        created_at: clock::parse_timestamp(&created_at_str)?,
        updated_at: clock::parse_timestamp(&updated_at_str)?,
        id,
        user_id,
        dog_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        clock::parse_time(s).unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        clock::parse_date(s).unwrap()
    }

    #[test]
    fn test_settings_round_trip() {
        let conn = setup_db();
        set_setting(&conn, "booking_time_granularity", "30").unwrap();
        set_setting(&conn, "booking_time_granularity", "20").unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM system_settings WHERE key = 'booking_time_granularity'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let settings = load_engine_settings(&conn).unwrap();
        assert_eq!(settings.granularity_minutes, 20);
        // seeded defaults
        assert!(settings.morning_walk_requires_approval);
        assert_eq!(settings.holiday_region, "BW");
    }

    #[test]
    fn test_rules_ordered_by_start_then_id() {
        let conn = setup_db();
        conn.execute("DELETE FROM booking_time_rules", []).unwrap();

        let late = NewTimeRule {
            day_type: DayType::Weekday,
            name: "late".to_string(),
            start: t("14:00"),
            end: t("15:00"),
            blocked: false,
        };
        let first = NewTimeRule { name: "first".to_string(), start: t("09:00"), ..late.clone() };
        let second = NewTimeRule { name: "second".to_string(), start: t("09:00"), blocked: true, ..late.clone() };
        create_rule(&conn, &late).unwrap();
        let first_id = create_rule(&conn, &first).unwrap();
        let second_id = create_rule(&conn, &second).unwrap();

        let rules = get_rules_by_day_type(&conn, DayType::Weekday).unwrap();
        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "late"]);
        assert!(first_id < second_id);
        assert!(rules[1].blocked);
        assert!(get_rules_by_day_type(&conn, DayType::Weekend).unwrap().is_empty());
    }

    #[test]
    fn test_rule_update_and_delete() {
        let conn = setup_db();
        let id = find_rule_by_name(&conn, DayType::Weekday, "Mittagspause")
            .unwrap()
            .unwrap();
        let mut rule = get_rule(&conn, id).unwrap().unwrap();
        assert!(rule.blocked);

        let changed = NewTimeRule {
            day_type: rule.day_type,
            name: rule.name.clone(),
            start: t("12:30"),
            end: t("13:30"),
            blocked: false,
        };
        assert!(update_rule(&conn, id, &changed).unwrap());
        rule = get_rule(&conn, id).unwrap().unwrap();
        assert_eq!(rule.start, t("12:30"));
        assert!(!rule.blocked);

        assert!(delete_rule(&conn, id).unwrap());
        assert!(!delete_rule(&conn, id).unwrap());
        assert!(get_rule(&conn, id).unwrap().is_none());
    }

    #[test]
    fn test_import_api_holidays_is_idempotent_and_spares_admin_rows() {
        let conn = setup_db();
        let admin = NewHoliday {
            date: d("2025-12-24"),
            name: "Heiligabend".to_string(),
            active: true,
            source: HolidaySource::Admin,
            created_by: Some(1),
        };
        create_holiday(&conn, &admin).unwrap();

        let batch = vec![
            (d("2025-01-01"), "Neujahrstag".to_string()),
            (d("2025-12-24"), "Überschrieben".to_string()),
        ];
        import_api_holidays(&conn, &batch).unwrap();
        import_api_holidays(&conn, &batch).unwrap();

        let holidays = get_holidays_by_year(&conn, 2025).unwrap();
        assert_eq!(holidays.len(), 2);
        assert_eq!(holidays[0].name, "Neujahrstag");
        assert_eq!(holidays[0].source, HolidaySource::Api);
        assert_eq!(holidays[1].name, "Heiligabend");
        assert_eq!(holidays[1].source, HolidaySource::Admin);
    }

    #[test]
    fn test_import_keeps_admin_deactivation() {
        let conn = setup_db();
        let batch = vec![(d("2025-05-01"), "Tag der Arbeit".to_string())];
        import_api_holidays(&conn, &batch).unwrap();

        let id = get_holidays_by_year(&conn, 2025).unwrap()[0].id;
        update_holiday(&conn, id, "Tag der Arbeit", false).unwrap();
        import_api_holidays(&conn, &batch).unwrap();

        assert!(!is_holiday(&conn, &d("2025-05-01")).unwrap());
        assert!(get_holiday(&conn, id).unwrap().is_some());
    }

    #[test]
    fn test_holiday_cache_replaces_entry() {
        let conn = setup_db();
        let fetched = d("2025-01-01").and_hms_opt(8, 0, 0).unwrap();
        let mut entry = HolidayCacheEntry {
            year: 2025,
            region: "BW".to_string(),
            payload: "{}".to_string(),
            fetched_at: fetched,
            expires_at: fetched + chrono::Duration::days(7),
        };
        put_holiday_cache(&conn, &entry).unwrap();
        entry.payload = r#"{"Neujahrstag":{"datum":"2025-01-01"}}"#.to_string();
        put_holiday_cache(&conn, &entry).unwrap();

        let stored = get_holiday_cache(&conn, 2025, "BW").unwrap().unwrap();
        assert_eq!(stored, entry);
        assert!(get_holiday_cache(&conn, 2025, "BY").unwrap().is_none());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM holiday_cache", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
