use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::error::{AppError, BookingError};
use crate::state::AppState;

/// Raw-body webhook endpoint. Success is only returned once the reduction
/// committed; any error yields a non-2xx so the gateway redelivers.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(BookingError::InvalidSignature)?;

    state.webhook_service.handle(&body, signature).await?;
    Ok(Json(json!({ "received": true })))
}
