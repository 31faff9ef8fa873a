use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::models::booking::BookingStatus;
use crate::domain::models::payment::PaymentUpdate;
use crate::domain::ports::{BookingRepository, Clock, GatewayEvent, PaymentGateway};
use crate::error::{AppError, BookingError};

/// Maps verified gateway events onto booking transitions. The gateway
/// redelivers on failure and delivers out of order, so every branch is
/// idempotent and pre-status-checked.
pub struct WebhookService {
    bookings: Arc<dyn BookingRepository>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
}

impl WebhookService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            gateway,
            clock,
        }
    }

    pub async fn handle(&self, payload: &[u8], signature: &str) -> Result<(), AppError> {
        let event = self.gateway.verify_webhook(payload, signature)?;

        match event {
            GatewayEvent::PaymentSucceeded {
                booking_id,
                payment_intent_id,
                charge_id,
            } => {
                self.reduce(
                    &booking_id,
                    BookingStatus::AwaitingPayment,
                    BookingStatus::Scheduled,
                    PaymentUpdate {
                        payment_intent_id: Some(payment_intent_id),
                        charge_id,
                        failure_reason: None,
                    },
                )
                .await
            }
            GatewayEvent::PaymentFailed {
                booking_id,
                payment_intent_id,
                failure_reason,
            } => {
                self.reduce(
                    &booking_id,
                    BookingStatus::AwaitingPayment,
                    BookingStatus::PaymentFailed,
                    PaymentUpdate {
                        payment_intent_id,
                        charge_id: None,
                        failure_reason,
                    },
                )
                .await
            }
            GatewayEvent::ChargeRefunded {
                booking_id,
                failure_reason,
            } => {
                self.reduce(
                    &booking_id,
                    BookingStatus::AwaitingRefund,
                    BookingStatus::Refunded,
                    PaymentUpdate {
                        payment_intent_id: None,
                        charge_id: None,
                        failure_reason,
                    },
                )
                .await
            }
            GatewayEvent::RefundCreated { booking_id } => {
                // AWAITING_REFUND -> AWAITING_REFUND: nothing to mutate,
                // the event only confirms the refund we initiated.
                self.require_booking(&booking_id).await?;
                info!(booking_id, "refund.created acknowledged");
                Ok(())
            }
            GatewayEvent::RefundFailed {
                booking_id,
                failure_reason,
            } => {
                self.reduce(
                    &booking_id,
                    BookingStatus::AwaitingRefund,
                    BookingStatus::RefundFailed,
                    PaymentUpdate {
                        payment_intent_id: None,
                        charge_id: None,
                        failure_reason,
                    },
                )
                .await
            }
            GatewayEvent::Ignored => Ok(()),
        }
    }

    async fn reduce(
        &self,
        booking_id: &str,
        expected: BookingStatus,
        target: BookingStatus,
        update: PaymentUpdate,
    ) -> Result<(), AppError> {
        let booking = self.require_booking(booking_id).await?;

        if booking.status == target {
            info!(booking_id, status = ?target, "webhook redelivery, already applied");
            return Ok(());
        }
        if booking.status != expected {
            // Late or out-of-order event; ack so the gateway stops retrying.
            warn!(
                booking_id,
                current = ?booking.status,
                expected = ?expected,
                "webhook ignored: unexpected pre-status"
            );
            return Ok(());
        }

        let rows = self
            .bookings
            .apply_payment_event(booking_id, expected, target, &update, self.clock.now())
            .await?;
        if rows == 0 {
            warn!(booking_id, "webhook lost the race, acknowledging");
            return Ok(());
        }

        info!(booking_id, status = ?target, "webhook applied");
        Ok(())
    }

    async fn require_booking(
        &self,
        booking_id: &str,
    ) -> Result<crate::domain::models::booking::Booking, AppError> {
        self.bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| BookingError::BookingNotFound.into())
    }
}
