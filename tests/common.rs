use tutoring_backend::{
    api::router::create_router,
    config::Config,
    domain::models::{
        booking::{Booking, BookingStatus, BookingType, NewBookingParams},
        payment::Payment,
        user::{Role, User},
    },
    domain::ports::{CheckoutSession, Clock, GatewayEvent, PaymentGateway},
    domain::services::{
        booking_service::BookingService, recurrence::RecurrenceService,
        webhook_service::WebhookService,
    },
    error::{AppError, BookingError},
    infra::clock::SystemClock,
    infra::repositories::{
        sqlite_booking_repo::SqliteBookingRepo, sqlite_recurring_repo::SqliteRecurringRepo,
        sqlite_user_repo::SqliteUserRepo,
    },
    state::AppState,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum GatewayCall {
    CreateSession { booking_id: String },
    ExpireSession { session_id: String },
    CreateRefund { payment_intent_id: String, booking_id: String },
}

/// Recording gateway double. Signature checking is reduced to a sentinel so
/// webhook tests exercise the reducer, not the crypto (the HMAC scheme has
/// its own unit tests next to the Stripe implementation).
pub struct MockPaymentGateway {
    pub calls: Mutex<Vec<GatewayCall>>,
    pub fail_create_session: AtomicBool,
    pub fail_expire_session: AtomicBool,
    pub fail_create_refund: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_create_session: AtomicBool::new(false),
            fail_expire_session: AtomicBool::new(false),
            fail_create_refund: AtomicBool::new(false),
        }
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }
}

fn booking_id_of(object: &Value) -> Result<String, BookingError> {
    object["metadata"]["bookingId"]
        .as_str()
        .map(str::to_string)
        .ok_or(BookingError::InvalidMetadata)
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_or_refresh_session(
        &self,
        booking: &Booking,
        existing: Option<&Payment>,
    ) -> Result<CheckoutSession, AppError> {
        if self.fail_create_session.load(Ordering::SeqCst) {
            return Err(AppError::InternalWithMsg("gateway down".into()));
        }
        self.calls.lock().unwrap().push(GatewayCall::CreateSession {
            booking_id: booking.id.clone(),
        });

        if let Some(session_id) = existing.and_then(|p| p.session_id.clone()) {
            return Ok(CheckoutSession {
                session_url: format!("https://pay.test/{session_id}"),
                session_id,
            });
        }
        let session_id = format!("cs_test_{}", booking.id);
        Ok(CheckoutSession {
            session_url: format!("https://pay.test/{session_id}"),
            session_id,
        })
    }

    async fn expire_session(&self, session_id: &str) -> Result<(), AppError> {
        if self.fail_expire_session.load(Ordering::SeqCst) {
            return Err(AppError::InternalWithMsg("gateway down".into()));
        }
        self.calls.lock().unwrap().push(GatewayCall::ExpireSession {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    async fn create_refund(&self, payment_intent_id: &str, booking_id: &str) -> Result<(), AppError> {
        if self.fail_create_refund.load(Ordering::SeqCst) {
            return Err(AppError::InternalWithMsg("gateway down".into()));
        }
        self.calls.lock().unwrap().push(GatewayCall::CreateRefund {
            payment_intent_id: payment_intent_id.to_string(),
            booking_id: booking_id.to_string(),
        });
        Ok(())
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<GatewayEvent, AppError> {
        if signature == "invalid" {
            return Err(BookingError::InvalidSignature.into());
        }
        let event: Value =
            serde_json::from_slice(payload).map_err(|_| BookingError::InvalidMetadata)?;
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
}

#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub pool: Pool<Sqlite>,
    pub db_filename: String,
    pub state: Arc<AppState>,
    pub gateway: Arc<MockPaymentGateway>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_filename = format!("test_{}.db", Uuid::new_v4());
        let db_url = format!("sqlite://{}?mode=rwc", db_filename);

        let connection_options = SqliteConnectOptions::from_str(&db_url)
            .unwrap()
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(connection_options)
            .await
            .expect("Failed to connect to test db");

        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .expect("Failed to migrate test db");

        let config = Config {
            database_url: db_url.clone(),
            port: 0,
            payment_gateway_secret: "sk_test".to_string(),
            payment_gateway_webhook_secret: "whsec_test".to_string(),
            frontend_url: "https://app.test".to_string(),
        };

        let gateway = Arc::new(MockPaymentGateway::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let user_repo = Arc::new(SqliteUserRepo::new(pool.clone()));
        let booking_repo = Arc::new(SqliteBookingRepo::new(pool.clone()));
        let recurring_repo = Arc::new(SqliteRecurringRepo::new(pool.clone()));

        let booking_service = Arc::new(BookingService::new(
            booking_repo.clone(),
            user_repo.clone(),
            gateway.clone(),
            clock.clone(),
        ));
        let recurrence_service = Arc::new(RecurrenceService::new(
            booking_repo.clone(),
            user_repo.clone(),
            recurring_repo.clone(),
            clock.clone(),
        ));
        let webhook_service = Arc::new(WebhookService::new(
            booking_repo.clone(),
            gateway.clone(),
            clock.clone(),
        ));

        let state = Arc::new(AppState {
            config,
            user_repo,
            booking_repo,
            recurring_repo,
            payment_gateway: gateway.clone(),
            clock,
            booking_service,
            recurrence_service,
            webhook_service,
        });

        let router = create_router(state.clone());

        Self {
            router,
            pool,
            db_filename,
            state,
            gateway,
        }
    }

    pub async fn create_user(&self, name: &str, roles: &[Role]) -> User {
        let user = User::new(name.to_string(), roles, Utc::now());
        self.state.user_repo.create(&user).await.unwrap()
    }

    #[allow(dead_code)]
    pub async fn seed_booking(
        &self,
        host: &User,
        participant: &User,
        start: DateTime<Utc>,
        booking_type: BookingType,
        status: BookingStatus,
    ) -> Booking {
        let booking = Booking::new(
            NewBookingParams {
                title: format!("Seeded {:?}", booking_type),
                description: None,
                start,
                booking_type,
                status,
                host_id: host.id.clone(),
                service_id: None,
                recurring_template_id: None,
            },
            Utc::now(),
        );
        self.state
            .booking_repo
            .create_checked(&booking, &participant.id)
            .await
            .unwrap()
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        user_id: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header("x-user-id", user_id);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    #[allow(dead_code)]
    pub async fn post_webhook(&self, event: Value, signature: &str) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/payments/webhook")
            .header("stripe-signature", signature)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(event.to_string()))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_filename);
    }
}

pub async fn parse_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

/// A whole-hour start `days` ahead, safely inside the one-month window.
#[allow(dead_code)]
pub fn future_start(days: i64, hour: u32) -> DateTime<Utc> {
    (Utc::now().date_naive() + Duration::days(days))
        .and_hms_opt(hour, 0, 0)
        .unwrap()
        .and_utc()
}
