use serde::Serialize;

use crate::domain::models::booking::Booking;

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: String,
}

#[derive(Serialize)]
pub struct PageMetadata {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

#[derive(Serialize)]
pub struct BookingListResponse {
    pub items: Vec<Booking>,
    pub metadata: PageMetadata,
}
