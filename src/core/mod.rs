//! Core business logic - framework-agnostic gifting operations.
//!
//! All functions are async, take an explicit database connection and return
//! `Result`; there is no global state. Collaborator traits from
//! [`crate::external`] are passed in where an operation touches an external
//! service.

/// Tree reservation against a request's purchased quantity
pub mod allocation;
/// Bulk artifact generation pipeline
pub mod artifact;
/// Greedy auto-assignment of reserved trees to recipients
pub mod assignment;
/// Bounded-concurrency task runner and retry/backoff
pub mod concurrency;
/// Durable background jobs for fire-and-forget pipelines
pub mod jobs;
/// Message text personalization (exact-compat string substitution)
pub mod personalize;
/// Gift request lifecycle helpers
pub mod request;
/// Card slot reconciliation against a recipient distribution
pub mod reconcile;
/// Request fulfillment status machine
pub mod status;
