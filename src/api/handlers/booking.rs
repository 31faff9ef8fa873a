use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::dtos::requests::{CreateBookingRequest, ListBookingsQuery, RescheduleBookingRequest};
use crate::api::dtos::responses::{BookingListResponse, CreatedResponse, PageMetadata};
use crate::api::extractors::current_user::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = state
        .booking_service
        .create(&user, &payload.start_time, &payload.to_user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListBookingsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let params = query.into_params()?;
    let page = state.booking_service.list(&user, &params).await?;

    let pages = if page.total == 0 {
        0
    } else {
        (page.total + params.limit - 1) / params.limit
    };

    Ok(Json(BookingListResponse {
        items: page.items,
        metadata: PageMetadata {
            total: page.total,
            page: params.page,
            limit: params.limit,
            pages,
        },
    }))
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let details = state.booking_service.get_one(&user, &booking_id).await?;
    Ok(Json(details))
}

pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(booking_id): Path<String>,
    Json(payload): Json<RescheduleBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state
        .booking_service
        .reschedule(&user, &booking_id, &payload.start_time)
        .await?;
    Ok(Json(booking))
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.booking_service.cancel(&user, &booking_id).await?;
    Ok(Json(booking))
}

pub async fn refund_booking(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state
        .booking_service
        .request_refund(&user, &booking_id)
        .await?;
    Ok(Json(booking))
}

pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.booking_service.confirm(&user, &booking_id).await?;
    Ok(Json(booking))
}
