mod common;

use axum::http::StatusCode;
use common::{error_code, future_start, parse_body, GatewayCall, TestApp};
use serde_json::json;
use std::sync::atomic::Ordering;
use tutoring_backend::domain::models::booking::{BookingStatus, BookingType};
use tutoring_backend::domain::models::user::{Role, User};

/// Creates a lesson awaiting tutor confirmation for a pair that already
/// completed its trial. Returns (student, tutor, booking id).
async fn lesson_awaiting_tutor(app: &TestApp) -> (User, User, String) {
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
    assert_eq!(res.status(), StatusCode::CREATED);
    let id = parse_body(res).await["id"].as_str().unwrap().to_string();
    (student, tutor, id)
}

async fn webhook_success(app: &TestApp, booking_id: &str) {
    let res = app
        .post_webhook(
            json!({
                "type": "payment_intent.succeeded",
                "data": { "object": {
                    "id": format!("pi_{booking_id}"),
                    "latest_charge": format!("ch_{booking_id}"),
                    "metadata": { "bookingId": booking_id }
                }}
            }),
            "test",
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn confirming_a_lesson_opens_a_checkout_session() {
    let app = TestApp::new().await;
    let (student, tutor, id) = lesson_awaiting_tutor(&app).await;

    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/confirm"), Some(&tutor.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = parse_body(res).await;
    assert_eq!(body["status"], "AWAITING_PAYMENT");

    let res = app
        .request("GET", &format!("/api/v1/bookings/{id}"), Some(&student.id), None)
        .await;
    let body = parse_body(res).await;
    assert_eq!(body["payment"]["sessionId"], format!("cs_test_{id}"));
    assert!(body["payment"]["sessionUrl"].as_str().unwrap().starts_with("https://pay.test/"));

    assert_eq!(
        app.gateway.calls(),
        vec![GatewayCall::CreateSession { booking_id: id }]
    );
}

#[tokio::test]
async fn confirming_a_trial_schedules_it_without_payment() {
    let app = TestApp::new().await;
    let student = app.create_user("Ada", &[Role::Student]).await;
    let tutor = app.create_user("Tom", &[Role::Tutor]).await;

    let res = app
        .request(
            "POST",
            "/api/v1/bookings",
            Some(&student.id),
            Some(json!({ "startTime": future_start(3, 9).to_rfc3339(), "toUserId": tutor.id })),
        )
        .await;
    let id = parse_body(res).await["id"].as_str().unwrap().to_string();

    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/confirm"), Some(&tutor.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(parse_body(res).await["status"], "SCHEDULED");
    assert!(app.gateway.calls().is_empty());
}

#[tokio::test]
async fn only_the_awaited_side_can_confirm() {
    let app = TestApp::new().await;
    let (student, _tutor, id) = lesson_awaiting_tutor(&app).await;

    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/confirm"), Some(&student.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(&parse_body(res).await), "INVALID_STATUS");
}

#[tokio::test]
async fn gateway_failure_leaves_the_booking_unconfirmed() {
    let app = TestApp::new().await;
    let (student, tutor, id) = lesson_awaiting_tutor(&app).await;

    app.gateway.fail_create_session.store(true, Ordering::SeqCst);
    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/confirm"), Some(&tutor.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&parse_body(res).await), "PAYMENT_SESSION_CREATION_FAILED");

    let res = app
        .request("GET", &format!("/api/v1/bookings/{id}"), Some(&student.id), None)
        .await;
    let body = parse_body(res).await;
    assert_eq!(body["status"], "AWAITING_TUTOR_CONFIRMATION");
    assert!(body["payment"].is_null());
}

#[tokio::test]
async fn cancel_in_awaiting_payment_expires_the_session_first() {
    let app = TestApp::new().await;
    let (student, tutor, id) = lesson_awaiting_tutor(&app).await;

    app.request("PATCH", &format!("/api/v1/bookings/{id}/confirm"), Some(&tutor.id), None)
        .await;

    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/cancel"), Some(&student.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(parse_body(res).await["status"], "CANCELED");

    let expirations: Vec<_> = app
        .gateway
        .calls()
        .into_iter()
        .filter(|c| matches!(c, GatewayCall::ExpireSession { .. }))
        .collect();
    assert_eq!(
        expirations,
        vec![GatewayCall::ExpireSession { session_id: format!("cs_test_{id}") }]
    );
}

#[tokio::test]
async fn failed_session_expiry_blocks_the_cancellation() {
    let app = TestApp::new().await;
    let (student, tutor, id) = lesson_awaiting_tutor(&app).await;
    app.request("PATCH", &format!("/api/v1/bookings/{id}/confirm"), Some(&tutor.id), None)
        .await;

    app.gateway.fail_expire_session.store(true, Ordering::SeqCst);
    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/cancel"), Some(&student.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&parse_body(res).await), "PAYMENT_CANCELLATION_FAILED");

    let res = app
        .request("GET", &format!("/api/v1/bookings/{id}"), Some(&student.id), None)
        .await;
    assert_eq!(parse_body(res).await["status"], "AWAITING_PAYMENT");
}

#[tokio::test]
async fn canceled_bookings_stay_canceled() {
    let app = TestApp::new().await;
    let (student, _tutor, id) = lesson_awaiting_tutor(&app).await;

    app.request("PATCH", &format!("/api/v1/bookings/{id}/cancel"), Some(&student.id), None)
        .await;
    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/cancel"), Some(&student.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(&parse_body(res).await), "INVALID_STATUS");
}

#[tokio::test]
async fn outsiders_cannot_touch_a_booking() {
    let app = TestApp::new().await;
    let (_student, _tutor, id) = lesson_awaiting_tutor(&app).await;
    let outsider = app.create_user("Eve", &[Role::Student]).await;

    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/cancel"), Some(&outsider.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(&parse_body(res).await), "UNAUTHORIZED");
}

#[tokio::test]
async fn refund_flows_through_the_gateway() {
    let app = TestApp::new().await;
    let (student, tutor, id) = lesson_awaiting_tutor(&app).await;

    app.request("PATCH", &format!("/api/v1/bookings/{id}/confirm"), Some(&tutor.id), None)
        .await;
    webhook_success(&app, &id).await;

    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/cancel/refund"), Some(&student.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(parse_body(res).await["status"], "AWAITING_REFUND");

    let refunds: Vec<_> = app
        .gateway
        .calls()
        .into_iter()
        .filter(|c| matches!(c, GatewayCall::CreateRefund { .. }))
        .collect();
    assert_eq!(
        refunds,
        vec![GatewayCall::CreateRefund {
            payment_intent_id: format!("pi_{id}"),
            booking_id: id,
        }]
    );
}

#[tokio::test]
async fn refund_requires_payment_information() {
    let app = TestApp::new().await;
    let student = app.create_user("Ada", &[Role::Student]).await;
    let tutor = app.create_user("Tom", &[Role::Tutor]).await;

    // A scheduled free meeting has no payment attached.
    let booking = app
        .seed_booking(
            &tutor,
            &student,
            future_start(3, 9),
            BookingType::FreeMeeting,
            BookingStatus::Scheduled,
        )
        .await;

    let res = app
        .request(
            "PATCH",
            &format!("/api/v1/bookings/{}/cancel/refund", booking.id),
            Some(&student.id),
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(&parse_body(res).await), "NO_PAYMENT_INFO");
}

#[tokio::test]
async fn refund_is_only_available_once_scheduled() {
    let app = TestApp::new().await;
    let (student, _tutor, id) = lesson_awaiting_tutor(&app).await;

    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/cancel/refund"), Some(&student.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(&parse_body(res).await), "INVALID_STATUS");
}

#[tokio::test]
async fn failed_refund_creation_keeps_the_booking_scheduled() {
    let app = TestApp::new().await;
    let (student, tutor, id) = lesson_awaiting_tutor(&app).await;
    app.request("PATCH", &format!("/api/v1/bookings/{id}/confirm"), Some(&tutor.id), None)
        .await;
    webhook_success(&app, &id).await;

    app.gateway.fail_create_refund.store(true, Ordering::SeqCst);
    let res = app
        .request("PATCH", &format!("/api/v1/bookings/{id}/cancel/refund"), Some(&student.id), None)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&parse_body(res).await), "REFUND_PROCESSING_FAILED");

    let res = app
        .request("GET", &format!("/api/v1/bookings/{id}"), Some(&student.id), None)
        .await;
    assert_eq!(parse_body(res).await["status"], "SCHEDULED");
}
