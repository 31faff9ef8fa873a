use crate::domain::models::booking::{BookingStatus, BookingType};

/// Statuses that occupy the host's calendar (overlap checks, I2) and block a
/// second free meeting for the pair (I3).
pub const ACTIVE_STATUSES: [BookingStatus; 4] = [
    BookingStatus::AwaitingTutorConfirmation,
    BookingStatus::AwaitingStudentConfirmation,
    BookingStatus::AwaitingPayment,
    BookingStatus::Scheduled,
];

pub const CANCELABLE_STATUSES: [BookingStatus; 5] = [
    BookingStatus::AwaitingTutorConfirmation,
    BookingStatus::AwaitingStudentConfirmation,
    BookingStatus::Scheduled,
    BookingStatus::AwaitingPayment,
    BookingStatus::PaymentFailed,
];

pub const NON_RESCHEDULABLE_STATUSES: [BookingStatus; 5] = [
    BookingStatus::Completed,
    BookingStatus::Canceled,
    BookingStatus::AwaitingRefund,
    BookingStatus::RefundFailed,
    BookingStatus::Refunded,
];

pub fn is_active(status: BookingStatus) -> bool {
    ACTIVE_STATUSES.contains(&status)
}

pub fn is_cancelable(status: BookingStatus) -> bool {
    CANCELABLE_STATUSES.contains(&status)
}

pub fn is_confirmable(status: BookingStatus) -> bool {
    matches!(
        status,
        BookingStatus::AwaitingTutorConfirmation | BookingStatus::AwaitingStudentConfirmation
    )
}

/// Confirming a trial schedules it directly; a lesson first has to be paid.
pub fn confirm_target(booking_type: BookingType) -> BookingStatus {
    match booking_type {
        BookingType::FreeMeeting => BookingStatus::Scheduled,
        BookingType::Lesson => BookingStatus::AwaitingPayment,
    }
}

/// Rescheduling hands the confirmation back to the other side.
pub fn reschedule_flip(status: BookingStatus) -> Option<BookingStatus> {
    match status {
        BookingStatus::AwaitingTutorConfirmation => Some(BookingStatus::AwaitingStudentConfirmation),
        BookingStatus::AwaitingStudentConfirmation => Some(BookingStatus::AwaitingTutorConfirmation),
        _ => None,
    }
}

/// Which side a pending confirmation (or reschedule) belongs to: true when
/// the host/tutor must act.
pub fn awaits_host(status: BookingStatus) -> Option<bool> {
    match status {
        BookingStatus::AwaitingTutorConfirmation => Some(true),
        BookingStatus::AwaitingStudentConfirmation => Some(false),
        _ => None,
    }
}
