pub mod pixel_service;
pub mod pixel_sync;

#[cfg(test)]
pub mod testing;

pub use pixel_service::PixelService;
pub use pixel_sync::PixelSyncJob;

use std::sync::Arc;

/// Start all background services
pub async fn start_background_services(sync_job: Arc<PixelSyncJob>) {
    tracing::info!("Starting background services...");

    sync_job.start().await;

    tracing::info!("Background services started");
}
