//! Background worker entry point.
//!
//! Initializes tracing, configuration and the database, then polls the job
//! queue forever. This binary ships with the dry-run artifact backend;
//! deployments with real slide and storage services run their own binary
//! wiring those implementations into the same worker loop.

use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use treegift::config::database::{create_connection, create_tables};
use treegift::config::load_app_configuration;
use treegift::core::jobs::run_worker;
use treegift::errors::Result;
use treegift::external::{DryRunSlides, DryRunStorage};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let app_config = load_app_configuration()?;
    info!("Successfully processed application configuration.");

    let db = create_connection(&app_config.database_url).await?;
    create_tables(&db).await?;
    info!("Database initialized successfully.");

    if app_config.card_template_presentation_id.is_none() {
        warn!("GIFT_CARD_PRESENTATION_ID is not set; artifact jobs will fail until configured");
    }

    let slides = DryRunSlides::default();
    let storage = DryRunStorage::default();
    info!(
        poll_seconds = app_config.worker_poll_seconds,
        "Starting background worker with the dry-run artifact backend."
    );
    run_worker(
        &db,
        &slides,
        &storage,
        app_config.card_template_presentation_id.as_deref(),
        Duration::from_secs(app_config.worker_poll_seconds),
    )
    .await
}
