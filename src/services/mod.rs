pub mod approval;
pub mod booking;
pub mod holidays;
pub mod scheduling;
