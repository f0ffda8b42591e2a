//! Dry-run artifact backend.
//!
//! Local development backend for the worker binary when no real slide or
//! storage service is wired in. Operations are logged and produce
//! deterministic placeholder ids and `dryrun://` URLs, so the pipeline,
//! status machine and job bookkeeping can be exercised end to end without
//! leaving the machine.

use crate::errors::Result;
use crate::external::slides::{SlideRecord, SlideTemplateApi};
use crate::external::storage::ArtifactStorage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Slide API that fabricates ids instead of calling a vendor.
#[derive(Debug, Default)]
pub struct DryRunSlides {
    presentations: AtomicU64,
    slide_counter: AtomicU64,
}

#[async_trait]
impl SlideTemplateApi for DryRunSlides {
    async fn duplicate_presentation(
        &self,
        template_presentation_id: &str,
        name: &str,
    ) -> Result<String> {
        let n = self.presentations.fetch_add(1, Ordering::SeqCst) + 1;
        info!(template_presentation_id, name, "dry-run: duplicate presentation");
        Ok(format!("dryrun-presentation-{n}"))
    }

    async fn duplicate_slides(
        &self,
        presentation_id: &str,
        template_ids: &[String],
    ) -> Result<Vec<String>> {
        info!(presentation_id, slides = template_ids.len(), "dry-run: duplicate slides");
        Ok(template_ids
            .iter()
            .map(|_| {
                let n = self.slide_counter.fetch_add(1, Ordering::SeqCst) + 1;
                format!("dryrun-slide-{n}")
            })
            .collect())
    }

    async fn bulk_update_slides(
        &self,
        presentation_id: &str,
        records: &[SlideRecord],
    ) -> Result<()> {
        info!(presentation_id, records = records.len(), "dry-run: bulk update slides");
        Ok(())
    }

    async fn delete_unused_slides(
        &self,
        presentation_id: &str,
        keep_slide_ids: &[String],
    ) -> Result<()> {
        info!(presentation_id, kept = keep_slide_ids.len(), "dry-run: delete unused slides");
        Ok(())
    }

    async fn reorder_slides(&self, presentation_id: &str, slide_ids: &[String]) -> Result<()> {
        info!(presentation_id, slides = slide_ids.len(), "dry-run: reorder slides");
        Ok(())
    }

    async fn export_presentation(
        &self,
        presentation_id: &str,
        mime_type: &str,
    ) -> Result<Vec<u8>> {
        info!(presentation_id, mime_type, "dry-run: export presentation");
        Ok(Vec::new())
    }

    async fn slide_thumbnail_url(&self, presentation_id: &str, slide_id: &str) -> Result<String> {
        Ok(format!("dryrun://{presentation_id}/{slide_id}.jpg"))
    }
}

/// Storage that returns `dryrun://` URLs without storing anything.
#[derive(Debug, Default)]
pub struct DryRunStorage;

#[async_trait]
impl ArtifactStorage for DryRunStorage {
    async fn store_pdf_pages(
        &self,
        pdf: &[u8],
        keys: &[String],
    ) -> Result<HashMap<String, String>> {
        info!(bytes = pdf.len(), pages = keys.len(), "dry-run: store pdf pages");
        Ok(keys
            .iter()
            .map(|key| (key.clone(), format!("dryrun://{key}")))
            .collect())
    }

    async fn upload_image_from_url(&self, url: &str, key: &str) -> Result<String> {
        info!(url, key, "dry-run: upload image");
        Ok(format!("dryrun://{key}"))
    }
}
