pub mod booking_service;
pub mod recurrence;
pub mod transitions;
pub mod webhook_service;
