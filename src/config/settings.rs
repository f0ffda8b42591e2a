//! Application settings for the gifting engine.
//!
//! Settings come from an optional `config.toml` file with environment
//! variables taking precedence, so deployments can run with env-only
//! configuration while local development uses the file.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Default SQLite database location when nothing is configured.
const DEFAULT_DATABASE_URL: &str = "sqlite://data/treegift.sqlite";

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,
    /// Master presentation holding the per-species card templates; artifact
    /// generation is refused when missing
    pub card_template_presentation_id: Option<String>,
    /// Seconds the background worker sleeps between job polls
    pub worker_poll_seconds: u64,
}

/// Raw `config.toml` contents; every field optional so env vars can fill in.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database_url: Option<String>,
    card_template_presentation_id: Option<String>,
    worker_poll_seconds: Option<u64>,
}

/// Loads `config.toml` from the given path, returning defaults when the file
/// does not exist.
fn load_file_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(FileConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads the application configuration from `./config.toml` and the
/// environment.
///
/// Environment variables override file values: `DATABASE_URL`,
/// `GIFT_CARD_PRESENTATION_ID`, `WORKER_POLL_SECONDS`.
pub fn load_app_configuration() -> Result<AppConfig> {
    let file = load_file_config("config.toml")?;

    let database_url = std::env::var("DATABASE_URL")
        .ok()
        .or(file.database_url)
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

    let card_template_presentation_id = std::env::var("GIFT_CARD_PRESENTATION_ID")
        .ok()
        .or(file.card_template_presentation_id);

    let worker_poll_seconds = match std::env::var("WORKER_POLL_SECONDS") {
        Ok(raw) => raw.parse().map_err(|_| Error::Config {
            message: format!("WORKER_POLL_SECONDS is not a number: {raw}"),
        })?,
        Err(_) => file.worker_poll_seconds.unwrap_or(5),
    };

    Ok(AppConfig {
        database_url,
        card_template_presentation_id,
        worker_poll_seconds,
    })
}
