use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{ConnectOptions, PgPool, SqlitePool};
use tracing::info;
use tracing::log::LevelFilter;

use crate::config::Config;
use crate::domain::ports::{Clock, PaymentGateway};
use crate::domain::services::booking_service::BookingService;
use crate::domain::services::recurrence::RecurrenceService;
use crate::domain::services::webhook_service::WebhookService;
use crate::infra::clock::SystemClock;
use crate::infra::payments::stripe_gateway::StripeGateway;
use crate::infra::repositories::{
    postgres_booking_repo::PostgresBookingRepo, postgres_recurring_repo::PostgresRecurringRepo,
    postgres_user_repo::PostgresUserRepo, sqlite_booking_repo::SqliteBookingRepo,
    sqlite_recurring_repo::SqliteRecurringRepo, sqlite_user_repo::SqliteUserRepo,
};
use crate::state::AppState;

pub async fn bootstrap_state(config: &Config) -> AppState {
    let database_url = &config.database_url;

    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(
        config.payment_gateway_secret.clone(),
        config.payment_gateway_webhook_secret.clone(),
        config.frontend_url.clone(),
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        info!("Initializing PostgreSQL connection...");

        let mut opts: PgConnectOptions = database_url.parse().expect("Invalid Postgres URL");
        opts = opts
            .log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await
            .expect("Failed to connect to Postgres");

        run_postgres_migrations(&pool).await;

        let user_repo = Arc::new(PostgresUserRepo::new(pool.clone()));
        let booking_repo = Arc::new(PostgresBookingRepo::new(pool.clone()));
        let recurring_repo = Arc::new(PostgresRecurringRepo::new(pool.clone()));

        build_state(config, user_repo, booking_repo, recurring_repo, gateway, clock)
    } else {
        info!("Initializing SQLite connection with WAL Mode...");

        let opts = SqliteConnectOptions::from_str(database_url)
            .expect("Invalid SQLite connection string")
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .expect("Failed to connect to SQLite");

        run_sqlite_migrations(&pool).await;

        let user_repo = Arc::new(SqliteUserRepo::new(pool.clone()));
        let booking_repo = Arc::new(SqliteBookingRepo::new(pool.clone()));
        let recurring_repo = Arc::new(SqliteRecurringRepo::new(pool.clone()));

        build_state(config, user_repo, booking_repo, recurring_repo, gateway, clock)
    }
}

fn build_state(
    config: &Config,
    user_repo: Arc<dyn crate::domain::ports::UserRepository>,
    booking_repo: Arc<dyn crate::domain::ports::BookingRepository>,
    recurring_repo: Arc<dyn crate::domain::ports::RecurringRepository>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
) -> AppState {
    let booking_service = Arc::new(BookingService::new(
        booking_repo.clone(),
        user_repo.clone(),
        gateway.clone(),
        clock.clone(),
    ));
    let recurrence_service = Arc::new(RecurrenceService::new(
        booking_repo.clone(),
        user_repo.clone(),
        recurring_repo.clone(),
        clock.clone(),
    ));
    let webhook_service = Arc::new(WebhookService::new(
        booking_repo.clone(),
        gateway.clone(),
        clock.clone(),
    ));

    AppState {
        config: config.clone(),
        user_repo,
        booking_repo,
        recurring_repo,
        payment_gateway: gateway,
        clock,
        booking_service,
        recurrence_service,
        webhook_service,
    }
}

async fn run_postgres_migrations(pool: &PgPool) {
    sqlx::migrate!("./migrations/postgres")
        .run(pool)
        .await
        .expect("Failed to run Postgres migrations");
}

async fn run_sqlite_migrations(pool: &SqlitePool) {
    sqlx::migrate!("./migrations/sqlite")
        .run(pool)
        .await
        .expect("Failed to run SQLite migrations");
}
