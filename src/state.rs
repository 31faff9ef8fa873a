use std::sync::Arc;

use crate::config::Config;
use crate::domain::ports::{
    BookingRepository, Clock, PaymentGateway, RecurringRepository, UserRepository,
};
use crate::domain::services::booking_service::BookingService;
use crate::domain::services::recurrence::RecurrenceService;
use crate::domain::services::webhook_service::WebhookService;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub user_repo: Arc<dyn UserRepository>,
    pub booking_repo: Arc<dyn BookingRepository>,
    pub recurring_repo: Arc<dyn RecurringRepository>,
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub clock: Arc<dyn Clock>,
    pub booking_service: Arc<BookingService>,
    pub recurrence_service: Arc<RecurrenceService>,
    pub webhook_service: Arc<WebhookService>,
}
