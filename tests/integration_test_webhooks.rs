mod common;

use axum::http::StatusCode;
use common::{error_code, future_start, parse_body, TestApp};
use serde_json::json;
use tutoring_backend::domain::models::booking::{BookingStatus, BookingType};
use tutoring_backend::domain::models::user::{Role, User};

async fn paid_lesson(app: &TestApp, status: BookingStatus) -> (User, User, String) {
    let student = app.create_user("Ada", &[Role::Student]).await;
    let tutor = app.create_user("Tom", &[Role::Tutor]).await;
    app.seed_booking(
        &tutor,
        &student,
        future_start(2, 8),
        BookingType::FreeMeeting,
        BookingStatus::Completed,
    )
    .await;

    let res = app
        .request(
            "POST",
            "/api/v1/bookings",
            Some(&student.id),
            Some(json!({ "startTime": future_start(5, 10).to_rfc3339(), "toUserId": tutor.id })),
        )
        .await;
    let id = parse_body(res).await["id"].as_str().unwrap().to_string();

    app.request("PATCH", &format!("/api/v1/bookings/{id}/confirm"), Some(&tutor.id), None)
        .await;

    // Walk the booking to the requested pre-status through the webhook flow.
    if status != BookingStatus::AwaitingPayment {
        let res = app
            .post_webhook(succeeded_event(&id), "test")
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }
    if status == BookingStatus::AwaitingRefund {
        let res = app
            .request("PATCH", &format!("/api/v1/bookings/{id}/cancel/refund"), Some(&student.id), None)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    (student, tutor, id)
}

fn succeeded_event(booking_id: &str) -> serde_json::Value {
    json!({
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": format!("pi_{booking_id}"),
            "latest_charge": format!("ch_{booking_id}"),
            "metadata": { "bookingId": booking_id }
        }}
    })
}

async fn status_of(app: &TestApp, user: &User, id: &str) -> String {
    let res = app
        .request("GET", &format!("/api/v1/bookings/{id}"), Some(&user.id), None)
        .await;
    parse_body(res).await["status"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn successful_payment_schedules_the_lesson() {
    let app = TestApp::new().await;
    let (student, _tutor, id) = paid_lesson(&app, BookingStatus::AwaitingPayment).await;

    let res = app.post_webhook(succeeded_event(&id), "test").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(status_of(&app, &student, &id).await, "SCHEDULED");

    let res = app
        .request("GET", &format!("/api/v1/bookings/{id}"), Some(&student.id), None)
        .await;
    let body = parse_body(res).await;
    assert_eq!(body["payment"]["paymentIntentId"], format!("pi_{id}"));
    assert_eq!(body["payment"]["chargeId"], format!("ch_{id}"));
}

#[tokio::test]
async fn redelivered_success_events_are_no_ops() {
    let app = TestApp::new().await;
    let (student, _tutor, id) = paid_lesson(&app, BookingStatus::AwaitingPayment).await;

    let res = app.post_webhook(succeeded_event(&id), "test").await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.post_webhook(succeeded_event(&id), "test").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(status_of(&app, &student, &id).await, "SCHEDULED");
}

#[tokio::test]
async fn failed_payment_records_the_reason() {
    let app = TestApp::new().await;
    let (student, _tutor, id) = paid_lesson(&app, BookingStatus::AwaitingPayment).await;

    let res = app
        .post_webhook(
            json!({
                "type": "payment_intent.payment_failed",
                "data": { "object": {
                    "id": format!("pi_{id}"),
                    "last_payment_error": { "message": "card_declined" },
                    "metadata": { "bookingId": id }
                }}
            }),
            "test",
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .request("GET", &format!("/api/v1/bookings/{id}"), Some(&student.id), None)
        .await;
    let body = parse_body(res).await;
    assert_eq!(body["status"], "PAYMENT_FAILED");
    assert_eq!(body["payment"]["metadata"]["failureReason"], "card_declined");
}

#[tokio::test]
async fn out_of_order_events_are_acknowledged_and_ignored() {
    let app = TestApp::new().await;
    let (student, _tutor, id) = paid_lesson(&app, BookingStatus::AwaitingPayment).await;

    // The student cancels before the payment event lands.
    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/cancel"), Some(&student.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.post_webhook(succeeded_event(&id), "test").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(status_of(&app, &student, &id).await, "CANCELED");
}

#[tokio::test]
async fn refund_created_is_an_acknowledged_no_op() {
    let app = TestApp::new().await;
    let (student, _tutor, id) = paid_lesson(&app, BookingStatus::AwaitingRefund).await;

    let res = app
        .post_webhook(
            json!({
                "type": "refund.created",
                "data": { "object": { "id": format!("re_{id}"), "metadata": { "bookingId": id } } }
            }),
            "test",
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(status_of(&app, &student, &id).await, "AWAITING_REFUND");
}

#[tokio::test]
async fn charge_refunded_completes_the_refund() {
    let app = TestApp::new().await;
    let (student, _tutor, id) = paid_lesson(&app, BookingStatus::AwaitingRefund).await;

    let res = app
        .post_webhook(
            json!({
                "type": "charge.refunded",
                "data": { "object": { "id": format!("ch_{id}"), "metadata": { "bookingId": id } } }
            }),
            "test",
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(status_of(&app, &student, &id).await, "REFUNDED");
}

#[tokio::test]
async fn refund_failure_is_recorded() {
    let app = TestApp::new().await;
    let (student, _tutor, id) = paid_lesson(&app, BookingStatus::AwaitingRefund).await;

    let res = app
        .post_webhook(
            json!({
                "type": "refund.failed",
                "data": { "object": {
                    "id": format!("re_{id}"),
                    "failure_reason": "expired_or_canceled_card",
                    "metadata": { "bookingId": id }
                }}
            }),
            "test",
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .request("GET", &format!("/api/v1/bookings/{id}"), Some(&student.id), None)
        .await;
    let body = parse_body(res).await;
    assert_eq!(body["status"], "REFUND_FAILED");
    assert_eq!(
        body["payment"]["metadata"]["failureReason"],
        "expired_or_canceled_card"
    );
}

#[tokio::test]
async fn unknown_event_types_are_accepted() {
    let app = TestApp::new().await;
    let res = app
        .post_webhook(json!({ "type": "customer.created", "data": { "object": {} } }), "test")
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_booking_metadata_is_rejected() {
    let app = TestApp::new().await;
    let res = app
        .post_webhook(
            json!({
                "type": "payment_intent.succeeded",
                "data": { "object": { "id": "pi_x", "metadata": {} } }
            }),
            "test",
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&parse_body(res).await), "INVALID_METADATA");
}

#[tokio::test]
async fn unknown_booking_fails_so_the_gateway_retries() {
    let app = TestApp::new().await;
    let res = app.post_webhook(succeeded_event("missing"), "test").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&parse_body(res).await), "BOOKING_NOT_FOUND");
}

#[tokio::test]
async fn bad_signature_is_rejected() {
    let app = TestApp::new().await;
    let res = app.post_webhook(succeeded_event("irrelevant"), "invalid").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&parse_body(res).await), "INVALID_SIGNATURE");
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let app = TestApp::new().await;
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let res = tower::ServiceExt::oneshot(app.router.clone(), request).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
