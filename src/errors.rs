//! Unified error type for the gifting engine.
//!
//! Allocation and reconciliation surface errors synchronously and abort the
//! whole operation; batch pipeline errors are isolated per task and only show
//! up in logs and job records.

use thiserror::Error;

/// All failure modes the engine can surface to a caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration problem (missing env var, bad config file).
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },

    /// Invalid caller input, with the offending field names.
    #[error("Validation failed: {message}")]
    Validation {
        /// Human-readable description of the problem
        message: String,
        /// Fields that failed validation
        fields: Vec<String>,
    },

    /// The referenced gift card request does not exist.
    #[error("Gift card request {id} not found")]
    RequestNotFound {
        /// Request primary key
        id: i64,
    },

    /// No plots have been assigned to the request yet, so trees cannot be
    /// reserved.
    #[error("No plots configured for gift card request {request_id}")]
    PlotsNotConfigured {
        /// Request primary key
        request_id: i64,
    },

    /// The inventory could not supply any trees for the request.
    #[error("No trees available to reserve ({requested} requested)")]
    TreesNotAvailable {
        /// Number of trees the request still needed
        requested: u64,
    },

    /// A tree supplied by the caller is already booked under another request.
    #[error("Some trees are already booked under another gift card request (request {request_id})")]
    TreesAlreadyBooked {
        /// Request primary key
        request_id: i64,
    },

    /// Reconciliation would orphan a card whose tree has already been
    /// delivered to a recipient.
    #[error("Gift cards of request {request_id} are already assigned to recipients")]
    CardsAlreadyAssigned {
        /// Request primary key
        request_id: i64,
    },

    /// A third-party call failed after retries were exhausted.
    #[error("External service '{service}' failed: {message}")]
    ExternalService {
        /// Which collaborator failed (e.g. "slides", "storage")
        service: &'static str,
        /// Last error message observed
        message: String,
    },

    /// Database error from the underlying store.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Convenience `Result` type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
