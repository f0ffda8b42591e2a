//! Collaborator contracts for external services.
//!
//! The engine treats inventory selection, slide rendering, artifact storage
//! and group membership as out-of-process collaborators behind async traits.
//! Production implementations (Google Slides, S3, ...) live outside this
//! crate; tests use in-memory fakes.

/// Dry-run artifact backend for local development
pub mod dryrun;
/// Donor group membership
pub mod groups;
/// Tree inventory selection
pub mod inventory;
/// Slide/template presentation API
pub mod slides;
/// Artifact image storage
pub mod storage;

pub use dryrun::{DryRunSlides, DryRunStorage};
pub use groups::DonorGroups;
pub use inventory::{PlotTreeInventory, ReserveTreesQuery, TreeInventory};
pub use slides::{SlideRecord, SlideTemplateApi};
pub use storage::ArtifactStorage;
