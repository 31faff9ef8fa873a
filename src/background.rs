use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info};

use crate::state::AppState;

const SWEEP_INTERVAL_SECS: u64 = 60;

/// Periodic sweep flipping elapsed SCHEDULED bookings to COMPLETED. The
/// command handlers never write COMPLETED themselves.
pub async fn start_background_worker(state: Arc<AppState>) {
    info!("Starting completion sweep worker...");

    loop {
        let now = state.clock.now();
        match state.booking_repo.complete_elapsed(now).await {
            Ok(0) => {}
            Ok(count) => info!("Completion sweep: {} bookings marked COMPLETED", count),
            Err(e) => error!("Completion sweep failed: {:?}", e),
        }
        sleep(Duration::from_secs(SWEEP_INTERVAL_SECS)).await;
    }
}
