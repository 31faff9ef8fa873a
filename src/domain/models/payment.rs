use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

use super::time::utc_millis;

/// Payment bookkeeping owned by a booking (1:1). The gateway's identifiers
/// arrive in two waves: session ids at confirmation, intent/charge ids via
/// webhooks.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub booking_id: String,
    pub session_id: Option<String>,
    pub session_url: Option<String>,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub metadata: Option<Json<HashMap<String, String>>>,
    #[serde(with = "utc_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "utc_millis")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn for_session(
        booking_id: String,
        session_id: String,
        session_url: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            booking_id,
            session_id: Some(session_id),
            session_url: Some(session_url),
            payment_intent_id: None,
            charge_id: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field patch applied to the payment row alongside a webhook-driven status
/// flip, in the same transaction.
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub failure_reason: Option<String>,
}
