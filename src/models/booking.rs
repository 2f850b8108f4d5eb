use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::clock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub user_id: i64,
    pub dog_id: i64,
    pub date: NaiveDate,
    #[serde(with = "clock::hhmm")]
    pub scheduled_time: NaiveTime,
    pub status: BookingStatus,
    pub user_notes: Option<String>,
    pub requires_approval: bool,
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<i64>,
    pub approved_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => BookingStatus::Completed,
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Scheduled,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Approved,
    Pending,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(ApprovalStatus::Approved),
            "pending" => Some(ApprovalStatus::Pending),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }

    /// Status a booking starts in. Decided once, at creation.
    pub fn initial(requires_approval: bool) -> Self {
        if requires_approval {
            ApprovalStatus::Pending
        } else {
            ApprovalStatus::Approved
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub user_id: i64,
    pub dog_id: i64,
    pub date: String,
    pub scheduled_time: String,
    pub user_notes: Option<String>,
}
