use std::sync::Arc;

use chrono::Months;
use tracing::{info, warn};

use crate::domain::models::{
    booking::{
        Booking, BookingDetails, BookingListParams, BookingPage, BookingStatus, BookingType,
        NewBookingParams,
    },
    payment::Payment,
    time::{parse_utc, Interval},
    user::{Role, User},
};
use crate::domain::ports::{BookingRepository, Clock, PaymentGateway, UserRepository};
use crate::domain::services::transitions;
use crate::error::{AppError, BookingError};

/// Candidate window probed for host conflicts before the booking type (and
/// with it the real duration) is known.
const CONFLICT_PROBE_MINUTES: i64 = 60;

/// Command handlers for the booking lifecycle. One instance is built at
/// startup and shared through `AppState`.
pub struct BookingService {
    bookings: Arc<dyn BookingRepository>,
    users: Arc<dyn UserRepository>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        users: Arc<dyn UserRepository>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            users,
            gateway,
            clock,
        }
    }

    pub async fn create(
        &self,
        current: &User,
        start_time_raw: &str,
        to_user_id: &str,
    ) -> Result<String, AppError> {
        let start = parse_utc(start_time_raw).ok_or(BookingError::InvalidDate)?;
        let now = self.clock.now();

        if start < now {
            return Err(BookingError::PastBooking.into());
        }
        let advance_limit = now
            .checked_add_months(Months::new(1))
            .ok_or(AppError::Internal)?;
        if start > advance_limit {
            return Err(BookingError::AdvanceBookingLimit.into());
        }
        if current.id == to_user_id {
            return Err(BookingError::YourselfBooking.into());
        }

        let other = self
            .users
            .find_by_id(to_user_id)
            .await?
            .ok_or(BookingError::UserNotFound)?;

        let initiator_is_tutor = current.is_tutor();
        if initiator_is_tutor && other.is_tutor() {
            return Err(BookingError::InvalidBookingCombination.into());
        }

        let (tutor, student) = if initiator_is_tutor {
            (current, &other)
        } else {
            (&other, current)
        };

        let probe = Interval::starting_at(start, CONFLICT_PROBE_MINUTES);
        let history = self
            .bookings
            .list_for_pair(&tutor.id, &student.id, probe.start, probe.end)
            .await?;

        if history.iter().any(|b| {
            transitions::is_active(b.status) && b.overlaps_window(probe.start, probe.end)
        }) {
            return Err(BookingError::BookingConflict.into());
        }
        if history.iter().any(|b| {
            b.booking_type == BookingType::FreeMeeting && transitions::is_active(b.status)
        }) {
            return Err(BookingError::OngoingFreeMeeting.into());
        }
        if initiator_is_tutor {
            let met_before = history.iter().any(|b| {
                matches!(b.status, BookingStatus::Completed | BookingStatus::Scheduled)
            });
            if !met_before {
                return Err(BookingError::NoPreviousMeeting.into());
            }
        }

        // A lesson becomes bookable only once the pair's trial COMPLETED.
        let trial_completed = history.iter().any(|b| {
            b.booking_type == BookingType::FreeMeeting && b.status == BookingStatus::Completed
        });
        let booking_type = if trial_completed {
            BookingType::Lesson
        } else {
            BookingType::FreeMeeting
        };

        if booking_type == BookingType::FreeMeeting && initiator_is_tutor {
            return Err(BookingError::FreeMeetingTutor.into());
        }

        let status = if initiator_is_tutor {
            BookingStatus::AwaitingStudentConfirmation
        } else {
            BookingStatus::AwaitingTutorConfirmation
        };

        let title = match booking_type {
            BookingType::FreeMeeting => format!("Free meeting with {}", tutor.name),
            BookingType::Lesson => format!("Lesson with {}", tutor.name),
        };

        let booking = Booking::new(
            NewBookingParams {
                title,
                description: None,
                start,
                booking_type,
                status,
                host_id: tutor.id.clone(),
                service_id: None,
                recurring_template_id: None,
            },
            now,
        );

        let created = self.bookings.create_checked(&booking, &student.id).await?;
        info!(booking_id = %created.id, host_id = %created.host_id, "booking created");
        Ok(created.id)
    }

    pub async fn cancel(&self, current: &User, booking_id: &str) -> Result<Booking, AppError> {
        let booking = self.load(booking_id).await?;
        self.authorize(current, &booking).await?;

        if !transitions::is_cancelable(booking.status) {
            return Err(BookingError::InvalidStatus.into());
        }

        // An open checkout session has to be expired at the gateway before
        // the cancellation commits.
        if booking.status == BookingStatus::AwaitingPayment {
            let payment = self
                .bookings
                .find_payment(booking_id)
                .await?
                .ok_or(BookingError::NoPaymentInfo)?;
            let session_id = payment.session_id.ok_or(BookingError::NoPaymentInfo)?;

            if let Err(e) = self.gateway.expire_session(&session_id).await {
                warn!(booking_id, "checkout session expiry failed: {e}");
                return Err(BookingError::PaymentCancellationFailed.into());
            }
        }

        let rows = self
            .bookings
            .transition(
                booking_id,
                &[booking.status],
                BookingStatus::Canceled,
                self.clock.now(),
            )
            .await?;
        if rows == 0 {
            return Err(BookingError::InvalidStatus.into());
        }

        info!(booking_id, "booking canceled");
        self.load(booking_id).await
    }

    pub async fn confirm(&self, current: &User, booking_id: &str) -> Result<Booking, AppError> {
        let booking = self.load(booking_id).await?;
        self.authorize(current, &booking).await?;

        if !transitions::is_confirmable(booking.status) {
            return Err(BookingError::InvalidStatus.into());
        }
        // Only the awaited side may confirm.
        let host_turn = transitions::awaits_host(booking.status).ok_or(BookingError::InvalidStatus)?;
        if host_turn != (current.id == booking.host_id) {
            return Err(BookingError::InvalidStatus.into());
        }

        let target = transitions::confirm_target(booking.booking_type);
        let now = self.clock.now();

        match booking.booking_type {
            BookingType::FreeMeeting => {
                let rows = self
                    .bookings
                    .transition(booking_id, &[booking.status], target, now)
                    .await?;
                if rows == 0 {
                    return Err(BookingError::InvalidStatus.into());
                }
            }
            BookingType::Lesson => {
                let existing = self.bookings.find_payment(booking_id).await?;
                let session = match self
                    .gateway
                    .create_or_refresh_session(&booking, existing.as_ref())
                    .await
                {
                    Ok(session) => session,
                    Err(e) => {
                        warn!(booking_id, "checkout session creation failed: {e}");
                        return Err(BookingError::PaymentSessionCreationFailed.into());
                    }
                };

                let payment = match existing {
                    Some(mut payment) => {
                        payment.session_id = Some(session.session_id);
                        payment.session_url = Some(session.session_url);
                        payment.updated_at = now;
                        payment
                    }
                    None => Payment::for_session(
                        booking.id.clone(),
                        session.session_id,
                        session.session_url,
                        now,
                    ),
                };

                self.bookings
                    .confirm_with_payment(booking_id, booking.status, target, &payment, now)
                    .await?;
            }
        }

        info!(booking_id, status = ?target, "booking confirmed");
        self.load(booking_id).await
    }

    pub async fn reschedule(
        &self,
        current: &User,
        booking_id: &str,
        start_time_raw: &str,
    ) -> Result<Booking, AppError> {
        let booking = self.load(booking_id).await?;
        self.authorize(current, &booking).await?;

        let start = parse_utc(start_time_raw).ok_or(BookingError::InvalidDate)?;
        let now = self.clock.now();
        if start < now {
            return Err(BookingError::PastTime.into());
        }
        if start == booking.start_time {
            return Err(BookingError::SameTime.into());
        }

        if transitions::NON_RESCHEDULABLE_STATUSES.contains(&booking.status) {
            return Err(BookingError::InvalidStatus.into());
        }

        let acting_as_host = current.id == booking.host_id;
        match transitions::awaits_host(booking.status) {
            Some(host_turn) if host_turn == acting_as_host => {}
            _ => {
                // Wrong side (or a status like AWAITING_PAYMENT that never
                // allows rescheduling): name the actor in the rejection.
                return Err(if acting_as_host {
                    BookingError::InvalidStatusTutor.into()
                } else {
                    BookingError::InvalidStatusStudent.into()
                });
            }
        }

        let to = transitions::reschedule_flip(booking.status).ok_or(BookingError::InvalidStatus)?;
        let end = start + chrono::Duration::minutes(booking.booking_type.duration_minutes());

        self.bookings
            .reschedule_checked(booking_id, &booking.host_id, booking.status, to, start, end, now)
            .await?;

        info!(booking_id, "booking rescheduled");
        self.load(booking_id).await
    }

    pub async fn request_refund(&self, current: &User, booking_id: &str) -> Result<Booking, AppError> {
        let booking = self.load(booking_id).await?;
        self.authorize(current, &booking).await?;

        if booking.status != BookingStatus::Scheduled {
            return Err(BookingError::InvalidStatus.into());
        }

        let payment = self
            .bookings
            .find_payment(booking_id)
            .await?
            .ok_or(BookingError::NoPaymentInfo)?;
        let intent = payment
            .payment_intent_id
            .ok_or(BookingError::NoPaymentInfo)?;

        // The refund exists at the gateway before the transition commits;
        // if the commit then fails, the refund.created webhook reconciles.
        if let Err(e) = self.gateway.create_refund(&intent, booking_id).await {
            warn!(booking_id, "refund creation failed: {e}");
            return Err(BookingError::RefundProcessingFailed.into());
        }

        let rows = self
            .bookings
            .transition(
                booking_id,
                &[BookingStatus::Scheduled],
                BookingStatus::AwaitingRefund,
                self.clock.now(),
            )
            .await?;
        if rows == 0 {
            return Err(BookingError::InvalidStatus.into());
        }

        info!(booking_id, "refund requested");
        self.load(booking_id).await
    }

    pub async fn get_one(&self, current: &User, booking_id: &str) -> Result<BookingDetails, AppError> {
        let booking = self.load(booking_id).await?;
        let participant_ids = self.bookings.participant_ids(booking_id).await?;

        let involved =
            current.id == booking.host_id || participant_ids.iter().any(|id| id == &current.id);
        if !involved && !current.has_role(Role::Admin) {
            return Err(BookingError::Unauthorized.into());
        }

        let host = self
            .users
            .summaries(std::slice::from_ref(&booking.host_id))
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::Internal)?;
        let participants = self.users.summaries(&participant_ids).await?;
        let payment = self.bookings.find_payment(booking_id).await?;

        Ok(BookingDetails {
            booking,
            host,
            participants,
            payment,
        })
    }

    pub async fn list(
        &self,
        current: &User,
        params: &BookingListParams,
    ) -> Result<BookingPage, AppError> {
        self.bookings.list_page(&current.id, params).await
    }

    async fn load(&self, booking_id: &str) -> Result<Booking, AppError> {
        self.bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| BookingError::BookingNotFound.into())
    }

    async fn authorize(&self, current: &User, booking: &Booking) -> Result<(), AppError> {
        if current.id == booking.host_id {
            return Ok(());
        }
        let participants = self.bookings.participant_ids(&booking.id).await?;
        if participants.iter().any(|id| id == &current.id) {
            return Ok(());
        }
        Err(BookingError::Unauthorized.into())
    }
}
