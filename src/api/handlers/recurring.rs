use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::api::dtos::requests::CreateRecurringRequest;
use crate::api::extractors::current_user::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

pub async fn create_recurring(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateRecurringRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .recurrence_service
        .create(&user, payload.into_request())
        .await?;

    let status = if outcome.recurring_template_id.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(outcome)))
}
