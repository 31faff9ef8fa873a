use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::payment::Payment;
use super::time::utc_millis;
use super::user::UserSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    AwaitingTutorConfirmation,
    AwaitingStudentConfirmation,
    AwaitingPayment,
    PaymentFailed,
    Scheduled,
    Canceled,
    Completed,
    AwaitingRefund,
    RefundFailed,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::AwaitingTutorConfirmation => "AWAITING_TUTOR_CONFIRMATION",
            BookingStatus::AwaitingStudentConfirmation => "AWAITING_STUDENT_CONFIRMATION",
            BookingStatus::AwaitingPayment => "AWAITING_PAYMENT",
            BookingStatus::PaymentFailed => "PAYMENT_FAILED",
            BookingStatus::Scheduled => "SCHEDULED",
            BookingStatus::Canceled => "CANCELED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::AwaitingRefund => "AWAITING_REFUND",
            BookingStatus::RefundFailed => "REFUND_FAILED",
            BookingStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWAITING_TUTOR_CONFIRMATION" => Ok(BookingStatus::AwaitingTutorConfirmation),
            "AWAITING_STUDENT_CONFIRMATION" => Ok(BookingStatus::AwaitingStudentConfirmation),
            "AWAITING_PAYMENT" => Ok(BookingStatus::AwaitingPayment),
            "PAYMENT_FAILED" => Ok(BookingStatus::PaymentFailed),
            "SCHEDULED" => Ok(BookingStatus::Scheduled),
            "CANCELED" => Ok(BookingStatus::Canceled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "AWAITING_REFUND" => Ok(BookingStatus::AwaitingRefund),
            "REFUND_FAILED" => Ok(BookingStatus::RefundFailed),
            "REFUNDED" => Ok(BookingStatus::Refunded),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingType {
    FreeMeeting,
    Lesson,
}

impl BookingType {
    pub fn duration_minutes(&self) -> i64 {
        match self {
            BookingType::FreeMeeting => 15,
            BookingType::Lesson => 60,
        }
    }
}

impl std::str::FromStr for BookingType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE_MEETING" => Ok(BookingType::FreeMeeting),
            "LESSON" => Ok(BookingType::Lesson),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "utc_millis")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "utc_millis")]
    pub end_time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub booking_type: BookingType,
    pub status: BookingStatus,
    pub host_id: String,
    pub service_id: Option<String>,
    pub recurring_template_id: Option<String>,
    #[serde(with = "utc_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "utc_millis")]
    pub updated_at: DateTime<Utc>,
}

pub struct NewBookingParams {
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub booking_type: BookingType,
    pub status: BookingStatus,
    pub host_id: String,
    pub service_id: Option<String>,
    pub recurring_template_id: Option<String>,
}

impl Booking {
    /// `end_time` always derives from the type's duration.
    pub fn new(params: NewBookingParams, now: DateTime<Utc>) -> Self {
        let end_time = params.start + Duration::minutes(params.booking_type.duration_minutes());

        Self {
            id: Uuid::new_v4().to_string(),
            title: params.title,
            description: params.description,
            start_time: params.start,
            end_time,
            booking_type: params.booking_type,
            status: params.status,
            host_id: params.host_id,
            service_id: params.service_id,
            recurring_template_id: params.recurring_template_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn overlaps_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }
}

/// Detailed view returned by GetOne: the booking plus the people on it and
/// the owned payment row.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub host: UserSummary,
    pub participants: Vec<UserSummary>,
    pub payment: Option<Payment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SortField {
    #[serde(rename = "START_TIME")]
    StartTime,
    #[serde(rename = "CREATED_AT")]
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "asc")]
    Asc,
    #[serde(rename = "desc")]
    Desc,
}

/// Validated listing filters; handlers parse the raw query string into this.
#[derive(Debug, Clone)]
pub struct BookingListParams {
    pub page: i64,
    pub limit: i64,
    pub statuses: Vec<BookingStatus>,
    pub booking_type: Option<BookingType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
}

pub struct BookingPage {
    pub items: Vec<Booking>,
    pub total: i64,
}
