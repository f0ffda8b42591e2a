//! Artifact storage collaborator.
//!
//! Wraps the PDF-to-image conversion and object-store upload; the engine
//! only sees keys going in and public URLs coming out.

use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Stores rendered card artifacts.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Splits a multi-page PDF into page images and stores them under the
    /// given keys (page N under `keys[N]`). Returns a key-to-URL map; keys
    /// missing from the map failed individually.
    async fn store_pdf_pages(&self, pdf: &[u8], keys: &[String])
    -> Result<HashMap<String, String>>;

    /// Downloads an image from a URL and stores it under the key, returning
    /// the stored URL.
    async fn upload_image_from_url(&self, url: &str, key: &str) -> Result<String>;
}
