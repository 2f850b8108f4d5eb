use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;

use crate::db::{self, queries};
use crate::models::{clock, ApprovalStatus, Booking, BookingRequest, BookingStatus, EngineSettings};
use crate::services::approval::requires_approval;
use crate::services::holidays::HolidayApi;
use crate::services::scheduling::{RuleEngine, SchedulingError};

/// Validates the requested time against the day's rules and stores the
/// booking. Its approval status is fixed here and never re-evaluated.
pub async fn create_booking(
    db: &Mutex<Connection>,
    api: &dyn HolidayApi,
    settings: &EngineSettings,
    req: &BookingRequest,
) -> Result<Booking, SchedulingError> {
    let date = clock::parse_date(&req.date)?;
    let time = clock::parse_time(&req.scheduled_time)?;

    let day_type = RuleEngine::new(db, api, settings).check_time(&date, &time).await?;

    let needs_approval = requires_approval(settings, &time);
    let now = Utc::now().naive_utc();
    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: req.user_id,
        dog_id: req.dog_id,
        date,
        scheduled_time: time,
        status: BookingStatus::Scheduled,
        user_notes: req
            .user_notes
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from),
        requires_approval: needs_approval,
        approval_status: ApprovalStatus::initial(needs_approval),
        approved_by: None,
        approved_at: None,
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    };

    {
        let conn = db::lock(db)?;
        if queries::dog_is_booked(&conn, req.dog_id, &date, &time)? {
            return Err(SchedulingError::AlreadyBooked { dog_id: req.dog_id });
        }
        queries::create_booking(&conn, &booking)?;
    }

    tracing::info!(
        booking_id = %booking.id,
        dog_id = booking.dog_id,
        date = %booking.date,
        time = %clock::format_time(&booking.scheduled_time),
        day_type = day_type.as_str(),
        approval_status = booking.approval_status.as_str(),
        "Booking created"
    );

    Ok(booking)
}
