use crate::domain::models::{
    booking::{Booking, BookingListParams, BookingPage, BookingStatus, BookingType, SortDirection, SortField},
    payment::{Payment, PaymentUpdate},
    time::Interval,
};
use crate::domain::ports::BookingRepository;
use crate::error::{AppError, BookingError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::sqlite_booking_repo::ACTIVE_SET_SQL;

pub struct PostgresBookingRepo {
    pool: PgPool,
}

impl PostgresBookingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_list_filters(qb: &mut QueryBuilder<'_, Postgres>, params: &BookingListParams) {
    if !params.statuses.is_empty() {
        qb.push(" AND b.status IN (");
        let mut sep = qb.separated(", ");
        for status in &params.statuses {
            sep.push_bind(*status);
        }
        qb.push(")");
    }
    if let Some(booking_type) = params.booking_type {
        qb.push(" AND b.booking_type = ").push_bind(booking_type);
    }
    if let Some(start) = params.start_date {
        qb.push(" AND b.start_time >= ").push_bind(start);
    }
    if let Some(end) = params.end_date {
        qb.push(" AND b.start_time <= ").push_bind(end);
    }
    if let Some(search) = &params.search {
        let pattern = format!("%{}%", search);
        qb.push(" AND (b.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR b.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl BookingRepository for PostgresBookingRepo {
    async fn create_checked(&self, booking: &Booking, participant_id: &str) -> Result<Booking, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let overlap_sql = format!(
            "SELECT COUNT(*) FROM bookings WHERE host_id = $1 AND status IN {ACTIVE_SET_SQL} AND start_time < $2 AND end_time > $3"
        );
        let overlapping: i64 = sqlx::query_scalar(&overlap_sql)
            .bind(&booking.host_id)
            .bind(booking.end_time)
            .bind(booking.start_time)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        if overlapping > 0 {
            return Err(BookingError::BookingConflict.into());
        }

        if booking.booking_type == BookingType::FreeMeeting {
            let trial_sql = format!(
                "SELECT COUNT(*) FROM bookings b JOIN booking_participants p ON p.booking_id = b.id
                 WHERE b.host_id = $1 AND p.user_id = $2 AND b.booking_type = 'FREE_MEETING' AND b.status IN {ACTIVE_SET_SQL}"
            );
            let trials: i64 = sqlx::query_scalar(&trial_sql)
                .bind(&booking.host_id)
                .bind(participant_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::Database)?;
            if trials > 0 {
                return Err(BookingError::OngoingFreeMeeting.into());
            }
        }

        let created = sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings (id, title, description, start_time, end_time, booking_type, status, host_id, service_id, recurring_template_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING *",
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
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        sqlx::query("INSERT INTO booking_participants (booking_id, user_id) VALUES ($1, $2)")
            .bind(&booking.id)
            .bind(participant_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(created)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, AppError> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn participant_ids(&self, booking_id: &str) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar("SELECT user_id FROM booking_participants WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_payment(&self, booking_id: &str) -> Result<Option<Payment>, AppError> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn list_for_pair(
        &self,
        tutor_id: &str,
        student_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, AppError> {
        let sql = format!(
            "SELECT DISTINCT b.* FROM bookings b JOIN booking_participants p ON p.booking_id = b.id
             WHERE b.host_id = $1 AND p.user_id = $2
               AND (b.status IN {ACTIVE_SET_SQL}
                    OR b.status IN ('COMPLETED','SCHEDULED')
                    OR (b.start_time < $3 AND b.end_time > $4))"
        );
        sqlx::query_as::<_, Booking>(&sql)
            .bind(tutor_id)
            .bind(student_id)
            .bind(window_end)
            .bind(window_start)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_overlapping(
        &self,
        host_id: &str,
        participant_id: Option<&str>,
        intervals: &[Interval],
    ) -> Result<Vec<Booking>, AppError> {
        if intervals.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT DISTINCT b.* FROM bookings b LEFT JOIN booking_participants p ON p.booking_id = b.id WHERE b.status IN ",
        );
        qb.push(ACTIVE_SET_SQL);
        qb.push(" AND (b.host_id = ").push_bind(host_id);
        if let Some(pid) = participant_id {
            qb.push(" OR p.user_id = ").push_bind(pid);
        }
        qb.push(") AND (");
        for (i, interval) in intervals.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("(b.start_time < ")
                .push_bind(interval.end)
                .push(" AND b.end_time > ")
                .push_bind(interval.start)
                .push(")");
        }
        qb.push(")");

        qb.build_query_as::<Booking>()
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn list_page(&self, user_id: &str, params: &BookingListParams) -> Result<BookingPage, AppError> {
        let mut count_qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(DISTINCT b.id) FROM bookings b LEFT JOIN booking_participants p ON p.booking_id = b.id WHERE (b.host_id = ",
        );
        count_qb
            .push_bind(user_id)
            .push(" OR p.user_id = ")
            .push_bind(user_id)
            .push(")");
        push_list_filters(&mut count_qb, params);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT DISTINCT b.* FROM bookings b LEFT JOIN booking_participants p ON p.booking_id = b.id WHERE (b.host_id = ",
        );
        qb.push_bind(user_id)
            .push(" OR p.user_id = ")
            .push_bind(user_id)
            .push(")");
        push_list_filters(&mut qb, params);

        let direction = match params.sort_direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        match params.sort_field {
            SortField::StartTime => {
                qb.push(format!(" ORDER BY b.start_time {direction}, b.created_at {direction}"));
            }
            SortField::CreatedAt => {
                qb.push(format!(" ORDER BY b.created_at {direction}"));
            }
        }
        qb.push(" LIMIT ")
            .push_bind(params.limit)
            .push(" OFFSET ")
            .push_bind((params.page - 1) * params.limit);

        let items = qb
            .build_query_as::<Booking>()
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(BookingPage { items, total })
    }

    async fn transition(
        &self,
        id: &str,
        from: &[BookingStatus],
        to: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE bookings SET status = ");
        qb.push_bind(to)
            .push(", updated_at = ")
            .push_bind(now)
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND status IN (");
        let mut sep = qb.separated(", ");
        for status in from {
            sep.push_bind(*status);
        }
        qb.push(")");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    async fn reschedule_checked(
        &self,
        id: &str,
        host_id: &str,
        from: BookingStatus,
        to: BookingStatus,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let overlap_sql = format!(
            "SELECT COUNT(*) FROM bookings WHERE host_id = $1 AND id != $2 AND status IN {ACTIVE_SET_SQL} AND start_time < $3 AND end_time > $4"
        );
        let overlapping: i64 = sqlx::query_scalar(&overlap_sql)
            .bind(host_id)
            .bind(id)
            .bind(new_end)
            .bind(new_start)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        if overlapping > 0 {
            return Err(BookingError::BookingConflict.into());
        }

        let result = sqlx::query(
            "UPDATE bookings SET start_time = $1, end_time = $2, status = $3, updated_at = $4 WHERE id = $5 AND status = $6",
        )
        .bind(new_start)
        .bind(new_end)
        .bind(to)
        .bind(now)
        .bind(id)
        .bind(from)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;
        if result.rows_affected() == 0 {
            return Err(BookingError::InvalidStatus.into());
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn confirm_with_payment(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let result = sqlx::query("UPDATE bookings SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4")
            .bind(to)
            .bind(now)
            .bind(id)
            .bind(from)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        if result.rows_affected() == 0 {
            return Err(BookingError::InvalidStatus.into());
        }

        sqlx::query(
            "INSERT INTO payments (id, booking_id, session_id, session_url, payment_intent_id, charge_id, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT(booking_id) DO UPDATE SET
               session_id = excluded.session_id,
               session_url = excluded.session_url,
               updated_at = excluded.updated_at",
        )
        .bind(&payment.id)
        .bind(&payment.booking_id)
        .bind(&payment.session_id)
        .bind(&payment.session_url)
        .bind(&payment.payment_intent_id)
        .bind(&payment.charge_id)
        .bind(&payment.metadata)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn apply_payment_event(
        &self,
        booking_id: &str,
        from: BookingStatus,
        to: BookingStatus,
        update: &PaymentUpdate,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let result = sqlx::query("UPDATE bookings SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4")
            .bind(to)
            .bind(now)
            .bind(booking_id)
            .bind(from)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        if result.rows_affected() == 0 {
            return Ok(0);
        }

        sqlx::query(
            "UPDATE payments SET payment_intent_id = COALESCE($1, payment_intent_id), charge_id = COALESCE($2, charge_id), updated_at = $3 WHERE booking_id = $4",
        )
        .bind(&update.payment_intent_id)
        .bind(&update.charge_id)
        .bind(now)
        .bind(booking_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        if let Some(reason) = &update.failure_reason {
            let metadata = sqlx::types::Json(HashMap::from([(
                "failureReason".to_string(),
                reason.clone(),
            )]));
            sqlx::query("UPDATE payments SET metadata = $1, updated_at = $2 WHERE booking_id = $3")
                .bind(metadata)
                .bind(now)
                .bind(booking_id)
                .execute(&mut *tx)
                .await
                .map_err(AppError::Database)?;
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    async fn complete_elapsed(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE bookings SET status = 'COMPLETED', updated_at = $1 WHERE status = 'SCHEDULED' AND end_time <= $2",
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }
}
