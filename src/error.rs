use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Domain rejections. Every variant carries a stable machine-readable code
/// returned to the caller; none of these are retried or logged at error
/// severity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    // Validation
    #[error("Could not parse the supplied date")]
    InvalidDate,
    #[error("Time slots must lie on the 15-minute grid and fit within a single day")]
    InvalidTimeSlot,
    #[error("Time slots overlap on the same weekday")]
    OverlappingTimeSlots,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Override time is not a valid slot start")]
    InvalidOverrideTime,

    // Business rules
    #[error("Booking start lies in the past")]
    PastBooking,
    #[error("New start time lies in the past")]
    PastTime,
    #[error("New start time equals the current start time")]
    SameTime,
    #[error("Bookings may start at most one month ahead")]
    AdvanceBookingLimit,
    #[error("Cannot book a meeting with yourself")]
    YourselfBooking,
    #[error("Bookings between two tutors are not allowed")]
    InvalidBookingCombination,
    #[error("A tutor cannot initiate a free meeting")]
    FreeMeetingTutor,
    #[error("Tutors can only book students they already met")]
    NoPreviousMeeting,
    #[error("A free meeting between these users is still pending")]
    OngoingFreeMeeting,
    #[error("No prior booking with this tutor")]
    NoPriorBooking,
    #[error("The requested time overlaps an existing booking")]
    BookingConflict,
    #[error("An active recurring template already covers this time slot")]
    RecurringTemplateConflict,
    #[error("An override still conflicts with an existing booking")]
    OverrideConflict,

    // State machine
    #[error("Booking status does not allow this operation")]
    InvalidStatus,
    #[error("Tutor cannot perform this operation in the current status")]
    InvalidStatusTutor,
    #[error("Student cannot perform this operation in the current status")]
    InvalidStatusStudent,

    // Authorization
    #[error("Not a participant of this booking")]
    Unauthorized,
    #[error("User not found")]
    UserNotFound,
    #[error("Booking not found")]
    BookingNotFound,
    #[error("Host is not a tutor")]
    InvalidHost,
    #[error("Participant cannot own a recurring schedule")]
    InvalidParticipant,

    // Payment
    #[error("Booking has no payment information")]
    NoPaymentInfo,
    #[error("Could not create a checkout session")]
    PaymentSessionCreationFailed,
    #[error("Could not expire the checkout session")]
    PaymentCancellationFailed,
    #[error("Could not create the refund")]
    RefundProcessingFailed,
    #[error("Webhook event carries no booking reference")]
    InvalidMetadata,
    #[error("Webhook signature verification failed")]
    InvalidSignature,
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::InvalidDate => "INVALID_DATE",
            BookingError::InvalidTimeSlot => "INVALID_TIME_SLOT",
            BookingError::OverlappingTimeSlots => "OVERLAPPING_TIME_SLOTS",
            BookingError::InvalidInput(_) => "INVALID_INPUT",
            BookingError::InvalidOverrideTime => "INVALID_OVERRIDE_TIME",
            BookingError::PastBooking => "PAST_BOOKING",
            BookingError::PastTime => "PAST_TIME",
            BookingError::SameTime => "SAME_TIME",
            BookingError::AdvanceBookingLimit => "ADVANCE_BOOKING_LIMIT",
            BookingError::YourselfBooking => "YOURSELF_BOOKING",
            BookingError::InvalidBookingCombination => "INVALID_BOOKING_COMBINATION",
            BookingError::FreeMeetingTutor => "FREE_MEETING_TUTOR",
            BookingError::NoPreviousMeeting => "NO_PREVIOUS_MEETING",
            BookingError::OngoingFreeMeeting => "ONGOING_FREE_MEETING",
            BookingError::NoPriorBooking => "NO_PRIOR_BOOKING",
            BookingError::BookingConflict => "BOOKING_CONFLICT",
            BookingError::RecurringTemplateConflict => "RECURRING_TEMPLATE_CONFLICT",
            BookingError::OverrideConflict => "OVERRIDE_CONFLICT",
            BookingError::InvalidStatus => "INVALID_STATUS",
            BookingError::InvalidStatusTutor => "INVALID_STATUS_TUTOR",
            BookingError::InvalidStatusStudent => "INVALID_STATUS_STUDENT",
            BookingError::Unauthorized => "UNAUTHORIZED",
            BookingError::UserNotFound => "USER_NOT_FOUND",
            BookingError::BookingNotFound => "BOOKING_NOT_FOUND",
            BookingError::InvalidHost => "INVALID_HOST",
            BookingError::InvalidParticipant => "INVALID_PARTICIPANT",
            BookingError::NoPaymentInfo => "NO_PAYMENT_INFO",
            BookingError::PaymentSessionCreationFailed => "PAYMENT_SESSION_CREATION_FAILED",
            BookingError::PaymentCancellationFailed => "PAYMENT_CANCELLATION_FAILED",
            BookingError::RefundProcessingFailed => "REFUND_PROCESSING_FAILED",
            BookingError::InvalidMetadata => "INVALID_METADATA",
            BookingError::InvalidSignature => "INVALID_SIGNATURE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BookingError::UserNotFound | BookingError::BookingNotFound => StatusCode::NOT_FOUND,
            BookingError::Unauthorized => StatusCode::FORBIDDEN,
            BookingError::BookingConflict
            | BookingError::RecurringTemplateConflict
            | BookingError::OverrideConflict
            | BookingError::OngoingFreeMeeting
            | BookingError::InvalidStatus
            | BookingError::InvalidStatusTutor
            | BookingError::InvalidStatusStudent
            | BookingError::NoPaymentInfo => StatusCode::CONFLICT,
            BookingError::PaymentSessionCreationFailed
            | BookingError::PaymentCancellationFailed
            | BookingError::RefundProcessingFailed => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error("Internal server error")]
    Internal,
    #[error("Internal server error: {0}")]
    InternalWithMsg(String),
}

fn error_body(code: &str, message: &str) -> Json<serde_json::Value> {
    Json(json!({ "error": { "code": code, "message": message } }))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(e) => {
                if let Some(db_err) = e.as_database_error() {
                    let code = db_err.code().unwrap_or_default();

                    // 2067 = SQLite Unique Constraint
                    // 23505 = PostgreSQL Unique Violation
                    if code == "2067" || code == "23505" {
                        return (
                            StatusCode::CONFLICT,
                            error_body("BOOKING_CONFLICT", "Resource already exists (duplicate entry)"),
                        )
                            .into_response();
                    }
                }

                error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("INTERNAL_SERVER_ERROR", "Internal server error"),
                )
                    .into_response()
            }
            AppError::Booking(e) => {
                (e.status(), error_body(e.code(), &e.to_string())).into_response()
            }
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("INTERNAL_SERVER_ERROR", "Internal server error"),
            )
                .into_response(),
            AppError::InternalWithMsg(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("INTERNAL_SERVER_ERROR", "Internal server error"),
                )
                    .into_response()
            }
        }
    }
}
