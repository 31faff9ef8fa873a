use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::time::{utc_millis, TimeOfDay, Weekday};

pub const RECURRING_LESSON_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrencePattern {
    Weekly,
    Biweekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateStatus {
    Active,
    Inactive,
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTemplate {
    pub id: String,
    pub host_id: String,
    pub recurrence_pattern: RecurrencePattern,
    pub duration_minutes: i64,
    pub status: TemplateStatus,
    #[serde(with = "utc_millis")]
    pub created_at: DateTime<Utc>,
}

impl RecurringTemplate {
    pub fn new(host_id: String, pattern: RecurrencePattern, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            host_id,
            recurrence_pattern: pattern,
            duration_minutes: RECURRING_LESSON_MINUTES as i64,
            status: TemplateStatus::Active,
            created_at: now,
        }
    }
}

/// One weekday/time-of-day anchor of a template. `time_of_day` is stored as
/// "HH:MM" text, validated against the grid before persistence.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTimeSlot {
    pub id: String,
    pub template_id: String,
    pub weekday: Weekday,
    pub time_of_day: String,
}

impl RecurringTimeSlot {
    pub fn new(template_id: String, weekday: Weekday, time_of_day: TimeOfDay) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            template_id,
            weekday,
            time_of_day: time_of_day.to_string(),
        }
    }

    pub fn time(&self) -> Option<TimeOfDay> {
        TimeOfDay::parse(&self.time_of_day)
    }
}

/// True when two 60-minute slot windows on the same weekday overlap.
pub fn slot_windows_overlap(a: &RecurringTimeSlot, b: &RecurringTimeSlot) -> bool {
    if a.weekday != b.weekday {
        return false;
    }
    match (a.time(), b.time()) {
        (Some(ta), Some(tb)) => {
            let (a_start, b_start) = (ta.minutes_from_midnight(), tb.minutes_from_midnight());
            a_start < b_start + RECURRING_LESSON_MINUTES && a_start + RECURRING_LESSON_MINUTES > b_start
        }
        _ => false,
    }
}

/// Raw recurrence input as the handler hands it over; times stay unparsed
/// strings so the expander owns every validation rejection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotInput {
    pub weekday: Weekday,
    pub time_of_day: String,
}

#[derive(Debug, Clone)]
pub struct OverrideDirective {
    pub conflict_time: String,
    pub new_time_of_day: Option<String>,
    pub cancel: bool,
}

#[derive(Debug, Clone)]
pub struct RecurringRequest {
    pub title: String,
    pub description: Option<String>,
    pub host_id: String,
    pub pattern: RecurrencePattern,
    pub slots: Vec<TimeSlotInput>,
    pub overrides: Vec<OverrideDirective>,
}

/// One offending instance plus free same-day alternatives ("HH:MM").
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotConflict {
    #[serde(with = "utc_millis")]
    pub conflict_time: DateTime<Utc>,
    pub alternative_times: Vec<String>,
}

/// Either a persisted template id or the conflicts that blocked expansion.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceOutcome {
    pub recurring_template_id: Option<String>,
    pub conflicts: Vec<TimeSlotConflict>,
}
