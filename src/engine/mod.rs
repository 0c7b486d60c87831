pub mod automation;
pub mod driver_response;
pub mod reminders;
pub mod webhook;

pub use automation::{NotificationOutcome, NotificationStatus, OrderAutomation, TransitionOutcome};
