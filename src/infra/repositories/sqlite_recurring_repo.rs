use crate::domain::models::{
    booking::Booking,
    recurring::{slot_windows_overlap, RecurringTemplate, RecurringTimeSlot},
};
use crate::domain::ports::RecurringRepository;
use crate::error::{AppError, BookingError};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::sqlite_booking_repo::ACTIVE_SET_SQL;

const ACTIVE_SLOTS_SQL: &str =
    "SELECT s.* FROM recurring_time_slots s JOIN recurring_templates t ON t.id = s.template_id
     WHERE t.host_id = ? AND t.status = 'ACTIVE'";

pub struct SqliteRecurringRepo {
    pool: SqlitePool,
}

impl SqliteRecurringRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecurringRepository for SqliteRecurringRepo {
    async fn active_slots_for_host(&self, host_id: &str) -> Result<Vec<RecurringTimeSlot>, AppError> {
        sqlx::query_as::<_, RecurringTimeSlot>(ACTIVE_SLOTS_SQL)
            .bind(host_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn create_with_bookings(
        &self,
        template: &RecurringTemplate,
        slots: &[RecurringTimeSlot],
        bookings: &[Booking],
        participant_id: &str,
    ) -> Result<String, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        // Re-check template windows and child overlaps inside the writing
        // transaction; the pre-flight checks are advisory only.
        let existing = sqlx::query_as::<_, RecurringTimeSlot>(ACTIVE_SLOTS_SQL)
            .bind(&template.host_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        for slot in slots {
            if existing.iter().any(|e| slot_windows_overlap(e, slot)) {
                return Err(BookingError::RecurringTemplateConflict.into());
            }
        }

        if !bookings.is_empty() {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT COUNT(DISTINCT b.id) FROM bookings b LEFT JOIN booking_participants p ON p.booking_id = b.id WHERE b.status IN ",
            );
            qb.push(ACTIVE_SET_SQL);
            qb.push(" AND (b.host_id = ")
                .push_bind(&template.host_id)
                .push(" OR p.user_id = ")
                .push_bind(participant_id)
                .push(") AND (");
            for (i, booking) in bookings.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("(b.start_time < ")
                    .push_bind(booking.end_time)
                    .push(" AND b.end_time > ")
                    .push_bind(booking.start_time)
                    .push(")");
            }
            qb.push(")");
            let overlapping: i64 = qb
                .build_query_scalar()
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::Database)?;
            if overlapping > 0 {
                return Err(BookingError::BookingConflict.into());
            }
        }

        sqlx::query(
            "INSERT INTO recurring_templates (id, host_id, recurrence_pattern, duration_minutes, status, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&template.id)
        .bind(&template.host_id)
        .bind(template.recurrence_pattern)
        .bind(template.duration_minutes)
        .bind(template.status)
        .bind(template.created_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        for slot in slots {
            sqlx::query(
                "INSERT INTO recurring_time_slots (id, template_id, weekday, time_of_day) VALUES (?, ?, ?, ?)",
            )
            .bind(&slot.id)
            .bind(&slot.template_id)
            .bind(slot.weekday)
            .bind(&slot.time_of_day)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        }

        for booking in bookings {
            sqlx::query(
                "INSERT INTO bookings (id, title, description, start_time, end_time, booking_type, status, host_id, service_id, recurring_template_id, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&booking.id)
            .bind(&booking.title)
            .bind(&booking.description)
            .bind(booking.start_time)
            .bind(booking.end_time)
            .bind(booking.booking_type)
            .bind(booking.status)
            .bind(&booking.host_id)
            .bind(&booking.service_id)
            .bind(&booking.recurring_template_id)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

            sqlx::query("INSERT INTO booking_participants (booking_id, user_id) VALUES (?, ?)")
                .bind(&booking.id)
                .bind(participant_id)
                .execute(&mut *tx)
                .await
                .map_err(AppError::Database)?;
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(template.id.clone())
    }
}
