//! Slide/template presentation collaborator.
//!
//! Card artifacts are built by duplicating per-species template slides inside
//! a copy of the master presentation, substituting personalized text, and
//! exporting the finished presentation.

use crate::errors::Result;
use async_trait::async_trait;

/// Personalized text for one card slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideRecord {
    /// Slide to update
    pub slide_id: String,
    /// Recipient display name
    pub name: String,
    /// Sapling tag printed on the card
    pub sapling: String,
    /// Personalized primary message
    pub primary_message: String,
    /// Secondary message
    pub secondary_message: String,
    /// Sponsor logo URL, empty when none
    pub logo_url: Option<String>,
    /// Text accompanying the logo
    pub logo_message: Option<String>,
}

/// Presentation manipulation operations the pipeline needs.
#[async_trait]
pub trait SlideTemplateApi: Send + Sync {
    /// Copies the master template presentation under a new name, returning
    /// the new presentation id.
    async fn duplicate_presentation(&self, template_presentation_id: &str, name: &str)
    -> Result<String>;

    /// Duplicates the given template slides into the presentation, returning
    /// the new slide ids in the same order.
    async fn duplicate_slides(
        &self,
        presentation_id: &str,
        template_ids: &[String],
    ) -> Result<Vec<String>>;

    /// Applies personalized text to many slides in one call.
    async fn bulk_update_slides(&self, presentation_id: &str, records: &[SlideRecord])
    -> Result<()>;

    /// Deletes every slide not listed in `keep_slide_ids` (the leftover
    /// template slides).
    async fn delete_unused_slides(&self, presentation_id: &str, keep_slide_ids: &[String])
    -> Result<()>;

    /// Reorders slides to match the given id order.
    async fn reorder_slides(&self, presentation_id: &str, slide_ids: &[String]) -> Result<()>;

    /// Exports the whole presentation in the given MIME type (one page per
    /// slide for `application/pdf`).
    async fn export_presentation(&self, presentation_id: &str, mime_type: &str)
    -> Result<Vec<u8>>;

    /// Returns a rendered thumbnail URL for a single slide; the slow per-card
    /// fallback when a bulk export fails.
    async fn slide_thumbnail_url(&self, presentation_id: &str, slide_id: &str) -> Result<String>;
}
