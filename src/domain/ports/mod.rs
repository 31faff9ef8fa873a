use crate::domain::models::{
    booking::{Booking, BookingListParams, BookingPage, BookingStatus},
    payment::{Payment, PaymentUpdate},
    recurring::{RecurringTemplate, RecurringTimeSlot},
    time::Interval,
    user::{User, UserSummary},
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Injectable time source so command logic never reaches for the ambient
/// clock directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;
    async fn summaries(&self, ids: &[String]) -> Result<Vec<UserSummary>, AppError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Inserts the booking and its participant row after re-running the
    /// host-overlap probe (and, for free meetings, the one-active-trial
    /// probe) inside the same transaction, so the checks are authoritative
    /// at commit time.
    async fn create_checked(&self, booking: &Booking, participant_id: &str) -> Result<Booking, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, AppError>;
    async fn participant_ids(&self, booking_id: &str) -> Result<Vec<String>, AppError>;
    async fn find_payment(&self, booking_id: &str) -> Result<Option<Payment>, AppError>;

    /// Single round trip loading every booking between the pair that is
    /// relevant to the create contract: active ones, COMPLETED/SCHEDULED
    /// history, and anything overlapping the candidate window.
    async fn list_for_pair(
        &self,
        tutor_id: &str,
        student_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, AppError>;

    /// Conflict detector: one OR-of-intervals query returning active
    /// bookings of the host (or the participant, when given) overlapping any
    /// candidate interval.
    async fn find_overlapping(
        &self,
        host_id: &str,
        participant_id: Option<&str>,
        intervals: &[Interval],
    ) -> Result<Vec<Booking>, AppError>;

    async fn list_page(&self, user_id: &str, params: &BookingListParams) -> Result<BookingPage, AppError>;

    /// Guarded status flip: `UPDATE ... WHERE id = ? AND status IN (from)`.
    /// Returns the number of rows affected; 0 means the booking raced away
    /// from the expected status.
    async fn transition(
        &self,
        id: &str,
        from: &[BookingStatus],
        to: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    /// Moves the booking and flips the awaiting direction after re-checking
    /// host overlap (excluding the booking itself) inside the transaction.
    async fn reschedule_checked(
        &self,
        id: &str,
        host_id: &str,
        from: BookingStatus,
        to: BookingStatus,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Confirm of a paid lesson: status flip plus payment upsert in one
    /// transaction. The checkout session has already been created.
    async fn confirm_with_payment(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Webhook reduction: guarded status flip plus payment field patch in
    /// one transaction. Returns rows affected (0 = raced, caller acks).
    async fn apply_payment_event(
        &self,
        booking_id: &str,
        from: BookingStatus,
        to: BookingStatus,
        update: &PaymentUpdate,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    /// Completion sweep: SCHEDULED bookings whose end has passed become
    /// COMPLETED.
    async fn complete_elapsed(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait RecurringRepository: Send + Sync {
    async fn active_slots_for_host(&self, host_id: &str) -> Result<Vec<RecurringTimeSlot>, AppError>;

    /// Persists the template, its slots and every child booking (plus
    /// participant rows) in one transaction, re-checking template-window
    /// and booking overlaps inside it.
    async fn create_with_bookings(
        &self,
        template: &RecurringTemplate,
        slots: &[RecurringTimeSlot],
        bookings: &[Booking],
        participant_id: &str,
    ) -> Result<String, AppError>;
}

pub struct CheckoutSession {
    pub session_id: String,
    pub session_url: String,
}

/// Typed webhook event after signature verification. Every carried
/// `booking_id` came from the event's metadata.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    PaymentSucceeded {
        booking_id: String,
        payment_intent_id: String,
        charge_id: Option<String>,
    },
    PaymentFailed {
        booking_id: String,
        payment_intent_id: Option<String>,
        failure_reason: Option<String>,
    },
    RefundCreated {
        booking_id: String,
    },
    RefundFailed {
        booking_id: String,
        failure_reason: Option<String>,
    },
    ChargeRefunded {
        booking_id: String,
        failure_reason: Option<String>,
    },
    /// Recognized envelope, irrelevant type; acknowledged without work.
    Ignored,
}

/// Outbound payment gateway port. Implementations live in infra; tests use
/// a recording mock.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Idempotent: an existing, still-open session from `existing` is
    /// reused instead of creating a new one.
    async fn create_or_refresh_session(
        &self,
        booking: &Booking,
        existing: Option<&Payment>,
    ) -> Result<CheckoutSession, AppError>;

    async fn expire_session(&self, session_id: &str) -> Result<(), AppError>;

    async fn create_refund(&self, payment_intent_id: &str, booking_id: &str) -> Result<(), AppError>;

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<GatewayEvent, AppError>;
}
