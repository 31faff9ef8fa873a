use crate::domain::models::{booking::Booking, payment::Payment};
use crate::domain::ports::{CheckoutSession, GatewayEvent, PaymentGateway};
use crate::error::{AppError, BookingError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com/v1";
const LESSON_PRICE_CENTS: u32 = 3500;

/// Stripe-backed implementation of the payment gateway port. Checkout
/// sessions, refunds and webhook events all carry the booking id in their
/// metadata so webhooks can be routed back.
pub struct StripeGateway {
    client: Client,
    secret_key: String,
    webhook_secret: String,
    frontend_url: String,
}

impl StripeGateway {
    pub fn new(secret_key: String, webhook_secret: String, frontend_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            secret_key,
            webhook_secret,
            frontend_url,
        }
    }

    async fn session_still_open(&self, session_id: &str) -> Option<CheckoutSession> {
        let res = self
            .client
            .get(format!("{API_BASE}/checkout/sessions/{session_id}"))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .ok()?;
        if !res.status().is_success() {
            return None;
        }
        let body: Value = res.json().await.ok()?;
        if body["status"].as_str() == Some("open") {
            Some(CheckoutSession {
                session_id: body["id"].as_str()?.to_string(),
                session_url: body["url"].as_str()?.to_string(),
            })
        } else {
            None
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_or_refresh_session(
        &self,
        booking: &Booking,
        existing: Option<&Payment>,
    ) -> Result<CheckoutSession, AppError> {
        // Reuse an open session rather than strand it at the gateway.
        if let Some(session_id) = existing.and_then(|p| p.session_id.as_deref())
            && let Some(session) = self.session_still_open(session_id).await
        {
            info!(booking_id = %booking.id, session_id, "reusing open checkout session");
            return Ok(session);
        }

        let success_url = format!("{}/bookings/{}?payment=success", self.frontend_url, booking.id);
        let cancel_url = format!("{}/bookings/{}?payment=canceled", self.frontend_url, booking.id);
        let amount = LESSON_PRICE_CENTS.to_string();

        let params: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", &success_url),
            ("cancel_url", &cancel_url),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", "eur"),
            ("line_items[0][price_data][unit_amount]", &amount),
            ("line_items[0][price_data][product_data][name]", &booking.title),
            ("metadata[bookingId]", &booking.id),
            ("payment_intent_data[metadata][bookingId]", &booking.id),
        ];

        let res = self
            .client
            .post(format!("{API_BASE}/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::InternalWithMsg(format!("gateway unreachable: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            warn!(booking_id = %booking.id, %status, "checkout session creation rejected: {text}");
            return Err(AppError::InternalWithMsg(format!(
                "checkout session creation failed: {status}"
            )));
        }

        let body: Value = res
            .json()
            .await
            .map_err(|e| AppError::InternalWithMsg(format!("gateway response unreadable: {e}")))?;

        match (body["id"].as_str(), body["url"].as_str()) {
            (Some(id), Some(url)) => Ok(CheckoutSession {
                session_id: id.to_string(),
                session_url: url.to_string(),
            }),
            _ => Err(AppError::InternalWithMsg(
                "checkout session response missing id/url".into(),
            )),
        }
    }

    async fn expire_session(&self, session_id: &str) -> Result<(), AppError> {
        let res = self
            .client
            .post(format!("{API_BASE}/checkout/sessions/{session_id}/expire"))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::InternalWithMsg(format!("gateway unreachable: {e}")))?;

        if !res.status().is_success() {
            return Err(AppError::InternalWithMsg(format!(
                "session expiry failed: {}",
                res.status()
            )));
        }
        Ok(())
    }

    async fn create_refund(&self, payment_intent_id: &str, booking_id: &str) -> Result<(), AppError> {
        let res = self
            .client
            .post(format!("{API_BASE}/refunds"))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("payment_intent", payment_intent_id),
                ("metadata[bookingId]", booking_id),
            ])
            .send()
            .await
            .map_err(|e| AppError::InternalWithMsg(format!("gateway unreachable: {e}")))?;

        if !res.status().is_success() {
            return Err(AppError::InternalWithMsg(format!(
                "refund creation failed: {}",
                res.status()
            )));
        }
        Ok(())
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<GatewayEvent, AppError> {
        let (timestamp, provided) = parse_signature_header(signature)
            .ok_or(BookingError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);

        let digest = hex::decode(provided).map_err(|_| BookingError::InvalidSignature)?;
        mac.verify_slice(&digest)
            .map_err(|_| BookingError::InvalidSignature)?;

        let event: Value =
            serde_json::from_slice(payload).map_err(|_| BookingError::InvalidMetadata)?;
        parse_event(&event)
    }
}

/// `Stripe-Signature: t=<unix>,v1=<hex hmac>` (other schemes ignored).
fn parse_signature_header(header: &str) -> Option<(String, String)> {
    let mut timestamp = None;
    let mut v1 = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value.to_string()),
            Some(("v1", value)) => v1 = Some(value.to_string()),
            _ => {}
        }
    }
    Some((timestamp?, v1?))
}

fn booking_id_of(object: &Value) -> Result<String, BookingError> {
    object["metadata"]["bookingId"]
        .as_str()
        .map(str::to_string)
        .ok_or(BookingError::InvalidMetadata)
}

fn parse_event(event: &Value) -> Result<GatewayEvent, AppError> {
    let object = &event["data"]["object"];

    match event["type"].as_str() {
        Some("payment_intent.succeeded") => Ok(GatewayEvent::PaymentSucceeded {
            booking_id: booking_id_of(object)?,
            payment_intent_id: object["id"]
                .as_str()
                .map(str::to_string)
                .ok_or(BookingError::InvalidMetadata)?,
            charge_id: object["latest_charge"].as_str().map(str::to_string),
        }),
        Some("payment_intent.payment_failed") => Ok(GatewayEvent::PaymentFailed {
            booking_id: booking_id_of(object)?,
            payment_intent_id: object["id"].as_str().map(str::to_string),
            failure_reason: object["last_payment_error"]["message"]
                .as_str()
                .map(str::to_string),
        }),
        Some("charge.refunded") => Ok(GatewayEvent::ChargeRefunded {
            booking_id: booking_id_of(object)?,
            failure_reason: object["failure_message"].as_str().map(str::to_string),
        }),
        Some("refund.created") => Ok(GatewayEvent::RefundCreated {
            booking_id: booking_id_of(object)?,
        }),
        Some("refund.failed") => Ok(GatewayEvent::RefundFailed {
            booking_id: booking_id_of(object)?,
            failure_reason: object["failure_reason"].as_str().map(str::to_string),
        }),
        _ => Ok(GatewayEvent::Ignored),
    }
}
