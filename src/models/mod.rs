pub mod booking;
pub mod clock;
pub mod holiday;
pub mod settings;
pub mod time_rule;

pub use booking::{ApprovalStatus, Booking, BookingRequest, BookingStatus};
pub use clock::InvalidInput;
pub use holiday::{HolidayCacheEntry, HolidayDraft, HolidayEntry, HolidaySource, HolidayUpdate, NewHoliday};
pub use settings::{EngineSettings, SettingsUpdate};
pub use time_rule::{DayType, NewTimeRule, TimeRule, TimeRuleDraft, TimeRuleUpdate};
