use std::sync::Mutex;

use chrono::{NaiveDateTime, NaiveTime, Utc};
use rusqlite::Connection;

use crate::db::{self, queries};
use crate::models::{ApprovalStatus, Booking, EngineSettings};

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("booking is {}, only pending bookings can be approved or rejected", .from.as_str())]
    InvalidTransition { from: ApprovalStatus },

    #[error("a rejection reason is required")]
    MissingReason,

    #[error("booking not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Whether a booking at `time` starts out pending. The morning window is
/// end-exclusive and independent of day type.
pub fn requires_approval(settings: &EngineSettings, time: &NaiveTime) -> bool {
    settings.morning_walk_requires_approval
        && *time >= settings.morning_start
        && *time < settings.morning_end
}

pub fn approve_booking(db: &Mutex<Connection>, id: &str, admin_id: i64) -> Result<Booking, ApprovalError> {
    approve_booking_at(db, id, admin_id, &Utc::now().naive_utc())
}

pub fn approve_booking_at(
    db: &Mutex<Connection>,
    id: &str,
    admin_id: i64,
    at: &NaiveDateTime,
) -> Result<Booking, ApprovalError> {
    let conn = db::lock(db)?;
    if !queries::approve_pending_booking(&conn, id, admin_id, at)? {
        return Err(transition_failure(&conn, id));
    }

    tracing::info!(booking_id = id, admin_id, "Booking approved");
    fetch_updated(&conn, id)
}

pub fn reject_booking(
    db: &Mutex<Connection>,
    id: &str,
    admin_id: i64,
    reason: &str,
) -> Result<Booking, ApprovalError> {
    reject_booking_at(db, id, admin_id, reason, &Utc::now().naive_utc())
}

pub fn reject_booking_at(
    db: &Mutex<Connection>,
    id: &str,
    admin_id: i64,
    reason: &str,
    at: &NaiveDateTime,
) -> Result<Booking, ApprovalError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ApprovalError::MissingReason);
    }

    let conn = db::lock(db)?;
    if !queries::reject_pending_booking(&conn, id, admin_id, at, reason)? {
        return Err(transition_failure(&conn, id));
    }

    tracing::info!(booking_id = id, admin_id, "Booking rejected");
    fetch_updated(&conn, id)
}

/// Explains why a conditional transition touched no row.
fn transition_failure(conn: &Connection, id: &str) -> ApprovalError {
    match queries::get_booking_by_id(conn, id) {
        Ok(Some(booking)) => ApprovalError::InvalidTransition {
            from: booking.approval_status,
        },
        Ok(None) => ApprovalError::NotFound,
        Err(e) => ApprovalError::Store(e),
    }
}

fn fetch_updated(conn: &Connection, id: &str) -> Result<Booking, ApprovalError> {
    queries::get_booking_by_id(conn, id)?.ok_or(ApprovalError::NotFound)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::clock;
    use crate::models::BookingStatus;

    fn t(s: &str) -> NaiveTime {
        clock::parse_time(s).unwrap()
    }

    fn morning_on() -> EngineSettings {
        EngineSettings {
            morning_walk_requires_approval: true,
            ..EngineSettings::default()
        }
    }

    fn insert_booking(db: &Mutex<Connection>, id: &str, status: ApprovalStatus) {
        let now = clock::parse_timestamp("2025-01-20 08:00:00").unwrap();
        let booking = Booking {
            id: id.to_string(),
            user_id: 7,
            dog_id: 3,
            date: clock::parse_date("2025-01-27").unwrap(),
            scheduled_time: t("10:00"),
            status: BookingStatus::Scheduled,
            user_notes: None,
            requires_approval: status == ApprovalStatus::Pending,
            approval_status: status,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        queries::create_booking(&db.lock().unwrap(), &booking).unwrap();
    }

    fn setup_db() -> Mutex<Connection> {
        Mutex::new(db::init_db(":memory:").unwrap())
    }

    #[test]
    fn test_requires_approval_window() {
        let s = morning_on();
        assert!(requires_approval(&s, &t("09:00")));
        assert!(requires_approval(&s, &t("10:00")));
        assert!(requires_approval(&s, &t("11:59")));
        assert!(!requires_approval(&s, &t("12:00")));
        assert!(!requires_approval(&s, &t("08:59")));
        assert!(!requires_approval(&s, &t("15:00")));
    }

    #[test]
    fn test_requires_approval_disabled() {
        let s = EngineSettings::default();
        assert!(!requires_approval(&s, &t("09:00")));
        assert!(!requires_approval(&s, &t("11:59")));
    }

    #[test]
    fn test_approve_pending() {
        let db = setup_db();
        insert_booking(&db, "b1", ApprovalStatus::Pending);
        let at = clock::parse_timestamp("2025-01-21 09:30:00").unwrap();

        let booking = approve_booking_at(&db, "b1", 42, &at).unwrap();
        assert_eq!(booking.approval_status, ApprovalStatus::Approved);
        assert_eq!(booking.approved_by, Some(42));
        assert_eq!(booking.approved_at, Some(at));
        assert_eq!(booking.status, BookingStatus::Scheduled);
        assert!(booking.rejection_reason.is_none());
    }

    #[test]
    fn test_double_approve_is_invalid_transition() {
        let db = setup_db();
        insert_booking(&db, "b1", ApprovalStatus::Pending);
        let first = clock::parse_timestamp("2025-01-21 09:30:00").unwrap();
        let second = clock::parse_timestamp("2025-01-21 10:00:00").unwrap();

        approve_booking_at(&db, "b1", 42, &first).unwrap();
        let err = approve_booking_at(&db, "b1", 43, &second).unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::InvalidTransition {
                from: ApprovalStatus::Approved
            }
        ));

        let booking = queries::get_booking_by_id(&db.lock().unwrap(), "b1").unwrap().unwrap();
        assert_eq!(booking.approved_by, Some(42));
        assert_eq!(booking.approved_at, Some(first));
    }

    #[test]
    fn test_default_approved_booking_cannot_transition() {
        let db = setup_db();
        insert_booking(&db, "b1", ApprovalStatus::Approved);

        assert!(matches!(
            approve_booking(&db, "b1", 42),
            Err(ApprovalError::InvalidTransition { .. })
        ));
        assert!(matches!(
            reject_booking(&db, "b1", 42, "zu voll"),
            Err(ApprovalError::InvalidTransition { .. })
        ));

        let booking = queries::get_booking_by_id(&db.lock().unwrap(), "b1").unwrap().unwrap();
        assert!(booking.approved_by.is_none());
        assert!(booking.approved_at.is_none());
    }

    #[test]
    fn test_reject_requires_reason() {
        let db = setup_db();
        insert_booking(&db, "b1", ApprovalStatus::Pending);

        for reason in ["", "   "] {
            assert!(matches!(
                reject_booking(&db, "b1", 42, reason),
                Err(ApprovalError::MissingReason)
            ));
        }

        let booking = queries::get_booking_by_id(&db.lock().unwrap(), "b1").unwrap().unwrap();
        assert_eq!(booking.approval_status, ApprovalStatus::Pending);
        assert_eq!(booking.status, BookingStatus::Scheduled);
    }

    #[test]
    fn test_reject_cancels_booking() {
        let db = setup_db();
        insert_booking(&db, "b1", ApprovalStatus::Pending);

        let booking = reject_booking(&db, "b1", 42, "  Hund ist krank ").unwrap();
        assert_eq!(booking.approval_status, ApprovalStatus::Rejected);
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.rejection_reason.as_deref(), Some("Hund ist krank"));
        assert_eq!(booking.approved_by, Some(42));
        assert!(booking.approved_at.is_some());

        assert!(matches!(
            approve_booking(&db, "b1", 42),
            Err(ApprovalError::InvalidTransition {
                from: ApprovalStatus::Rejected
            })
        ));
    }

    #[test]
    fn test_unknown_booking_not_found() {
        let db = setup_db();
        assert!(matches!(approve_booking(&db, "nope", 1), Err(ApprovalError::NotFound)));
        assert!(matches!(reject_booking(&db, "nope", 1, "x"), Err(ApprovalError::NotFound)));
    }

    #[test]
    fn test_concurrent_approvals_one_winner() {
        let db = Arc::new(setup_db());
        insert_booking(&db, "b1", ApprovalStatus::Pending);

        let handles: Vec<_> = (0..8)
            .map(|admin| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    if admin % 2 == 0 {
                        approve_booking(&db, "b1", admin).map(|_| ())
                    } else {
                        reject_booking(&db, "b1", admin, "belegt").map(|_| ())
                    }
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, ApprovalError::InvalidTransition { .. })));
    }
}
