use serde::Deserialize;

use crate::domain::models::{
    booking::{BookingListParams, BookingStatus, BookingType, SortDirection, SortField},
    recurring::{OverrideDirective, RecurrencePattern, RecurringRequest, TimeSlotInput},
    time::parse_utc,
};
use crate::error::BookingError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub start_time: String,
    pub to_user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleBookingRequest {
    pub start_time: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    pub conflict_time: String,
    pub new_time_of_day: Option<String>,
    #[serde(default)]
    pub cancel: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecurringRequest {
    pub title: String,
    pub description: Option<String>,
    pub host_id: String,
    pub recurrence_pattern: RecurrencePattern,
    pub time_slots: Vec<TimeSlotInput>,
    #[serde(default)]
    pub overrides: Vec<OverrideRequest>,
}

impl CreateRecurringRequest {
    pub fn into_request(self) -> RecurringRequest {
        RecurringRequest {
            title: self.title,
            description: self.description,
            host_id: self.host_id,
            pattern: self.recurrence_pattern,
            slots: self.time_slots,
            overrides: self
                .overrides
                .into_iter()
                .map(|o| OverrideDirective {
                    conflict_time: o.conflict_time,
                    new_time_of_day: o.new_time_of_day,
                    cancel: o.cancel,
                })
                .collect(),
        }
    }
}

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

/// Raw listing query string; `into_params` applies the declarative
/// per-field and cross-field rules.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListBookingsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub booking_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub sort_field: Option<SortField>,
    pub sort_direction: Option<SortDirection>,
}

impl ListBookingsQuery {
    pub fn into_params(self) -> Result<BookingListParams, BookingError> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(BookingError::InvalidInput("page must be >= 1".into()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(BookingError::InvalidInput(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let mut statuses = Vec::new();
        if let Some(raw) = &self.status {
            for token in raw.split(',').filter(|t| !t.is_empty()) {
                let status: BookingStatus = token
                    .trim()
                    .parse()
                    .map_err(|_| BookingError::InvalidInput(format!("unknown status: {token}")))?;
                statuses.push(status);
            }
        }

        let booking_type = match &self.booking_type {
            Some(raw) => Some(
                raw.parse::<BookingType>()
                    .map_err(|_| BookingError::InvalidInput(format!("unknown type: {raw}")))?,
            ),
            None => None,
        };

        let start_date = match &self.start_date {
            Some(raw) => Some(parse_utc(raw).ok_or(BookingError::InvalidDate)?),
            None => None,
        };
        let end_date = match &self.end_date {
            Some(raw) => Some(parse_utc(raw).ok_or(BookingError::InvalidDate)?),
            None => None,
        };
        if let (Some(start), Some(end)) = (start_date, end_date)
            && start > end
        {
            return Err(BookingError::InvalidInput(
                "startDate must not be after endDate".into(),
            ));
        }

        Ok(BookingListParams {
            page,
            limit,
            statuses,
            booking_type,
            start_date,
            end_date,
            search: self.search.filter(|s| !s.is_empty()),
            sort_field: self.sort_field.unwrap_or(SortField::StartTime),
            sort_direction: self.sort_direction.unwrap_or(SortDirection::Desc),
        })
    }
}
