//! Shared test fixtures: an in-memory database, row factories and in-memory
//! fakes for the external collaborators.
#![allow(clippy::unwrap_used)]

use crate::config::database::create_tables;
use crate::core::request::{CreateRequestInput, create_gift_card_request};
use crate::entities::{gift_card, gift_card_request, plant_type_template, tree};
use crate::errors::{Error, Result};
use crate::external::{
    ArtifactStorage, DonorGroups, ReserveTreesQuery, SlideRecord, SlideTemplateApi, TreeInventory,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::{Database, QueryOrder, Set, prelude::*};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Creates a fresh in-memory database with all tables.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    create_tables(&db).await?;
    Ok(db)
}

/// A valid request input for `n` cards.
pub fn test_request_input(n: i64) -> CreateRequestInput {
    CreateRequestInput {
        user_id: 1,
        group_id: None,
        no_of_cards: n,
        category: "Public".to_string(),
        request_type: "Cards Request".to_string(),
        event_type: None,
        event_name: Some("Gifting".to_string()),
        planted_by: Some("Acme Corp".to_string()),
        gifted_on: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        primary_message: None,
        secondary_message: None,
        logo_url: Some("https://cdn.example/logo.png".to_string()),
        logo_message: None,
    }
}

/// Creates a request for `n` cards.
pub async fn create_test_request(
    db: &DatabaseConnection,
    n: i64,
) -> Result<gift_card_request::Model> {
    create_gift_card_request(db, test_request_input(n)).await
}

/// Inserts a tree row.
pub async fn create_test_tree(
    db: &DatabaseConnection,
    sapling_id: &str,
    plant_type: &str,
    plot_id: i64,
) -> Result<tree::Model> {
    let now = Utc::now();
    let row = tree::ActiveModel {
        sapling_id: Set(sapling_id.to_string()),
        plant_type: Set(plant_type.to_string()),
        plot_id: Set(plot_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Inserts a card slot, optionally with a tree already bound.
pub async fn create_booked_slot(
    db: &DatabaseConnection,
    request_id: i64,
    tree_id: Option<i64>,
) -> Result<gift_card::Model> {
    let now = Utc::now();
    let row = gift_card::ActiveModel {
        gift_card_request_id: Set(request_id),
        tree_id: Set(tree_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Inserts a species-to-template mapping.
pub async fn create_plant_type_template(
    db: &DatabaseConnection,
    plant_type: &str,
    template_id: &str,
) -> Result<plant_type_template::Model> {
    let now = Utc::now();
    let row = plant_type_template::ActiveModel {
        plant_type: Set(plant_type.to_string()),
        template_id: Set(template_id.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Inventory fake backed by the test database: returns every unmapped tree
/// in id order, ignoring the count cap so callers' truncation is exercised.
pub struct FakeInventory {
    db: DatabaseConnection,
}

impl FakeInventory {
    /// Creates `n` unmapped trees and an inventory serving them.
    pub async fn with_trees(db: &DatabaseConnection, n: usize) -> Result<Self> {
        for i in 0..n {
            create_test_tree(db, &format!("INV-{i}"), "Neem", 1).await?;
        }
        Ok(Self { db: db.clone() })
    }
}

#[async_trait]
impl TreeInventory for FakeInventory {
    async fn reserve_trees(&self, _query: ReserveTreesQuery) -> Result<Vec<i64>> {
        let trees = tree::Entity::find()
            .filter(tree::Column::MappedToUser.is_null())
            .order_by_asc(tree::Column::Id)
            .all(&self.db)
            .await?;
        Ok(trees.into_iter().map(|t| t.id).collect())
    }
}

/// Donor group fake recording memberships in memory.
#[derive(Default)]
pub struct FakeDonorGroups {
    members: Mutex<HashSet<i64>>,
}

impl FakeDonorGroups {
    /// Whether the user was added to the donor group.
    pub fn contains(&self, user_id: i64) -> bool {
        self.members.lock().unwrap().contains(&user_id)
    }
}

#[async_trait]
impl DonorGroups for FakeDonorGroups {
    async fn add_user_to_donor_group(&self, user_id: i64) -> Result<()> {
        self.members.lock().unwrap().insert(user_id);
        Ok(())
    }
}

/// Slide API fake with deterministic ids (`pres-1`, `pres-2`, ...) and
/// per-presentation export failure injection.
#[derive(Default)]
pub struct FakeSlides {
    presentations: AtomicUsize,
    slide_counter: AtomicUsize,
    failing_exports: Mutex<HashSet<String>>,
    records: Mutex<Vec<SlideRecord>>,
}

impl FakeSlides {
    /// Makes `export_presentation` fail for the given presentation id.
    pub fn fail_export(&self, presentation_id: &str) {
        self.failing_exports
            .lock()
            .unwrap()
            .insert(presentation_id.to_string());
    }

    /// All slide records passed to `bulk_update_slides` so far.
    pub fn records(&self) -> Vec<SlideRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of presentations created so far.
    pub fn presentation_count(&self) -> usize {
        self.presentations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SlideTemplateApi for FakeSlides {
    async fn duplicate_presentation(
        &self,
        _template_presentation_id: &str,
        _name: &str,
    ) -> Result<String> {
        let n = self.presentations.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("pres-{n}"))
    }

    async fn duplicate_slides(
        &self,
        _presentation_id: &str,
        template_ids: &[String],
    ) -> Result<Vec<String>> {
        Ok(template_ids
            .iter()
            .map(|_| {
                let n = self.slide_counter.fetch_add(1, Ordering::SeqCst) + 1;
                format!("slide-{n}")
            })
            .collect())
    }

    async fn bulk_update_slides(
        &self,
        _presentation_id: &str,
        records: &[SlideRecord],
    ) -> Result<()> {
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(())
    }

    async fn delete_unused_slides(
        &self,
        _presentation_id: &str,
        _keep_slide_ids: &[String],
    ) -> Result<()> {
        Ok(())
    }

    async fn reorder_slides(&self, _presentation_id: &str, _slide_ids: &[String]) -> Result<()> {
        Ok(())
    }

    async fn export_presentation(
        &self,
        presentation_id: &str,
        _mime_type: &str,
    ) -> Result<Vec<u8>> {
        if self.failing_exports.lock().unwrap().contains(presentation_id) {
            return Err(Error::ExternalService {
                service: "slides",
                message: format!("export of {presentation_id} failed"),
            });
        }
        Ok(vec![0u8; 4])
    }

    async fn slide_thumbnail_url(&self, presentation_id: &str, slide_id: &str) -> Result<String> {
        Ok(format!("thumb-src://{presentation_id}/{slide_id}"))
    }
}

/// Storage fake returning distinguishable URLs for the bulk and thumbnail
/// paths (`bulk://` vs `thumb://`).
#[derive(Default)]
pub struct FakeStorage;

#[async_trait]
impl ArtifactStorage for FakeStorage {
    async fn store_pdf_pages(
        &self,
        _pdf: &[u8],
        keys: &[String],
    ) -> Result<HashMap<String, String>> {
        Ok(keys
            .iter()
            .map(|key| (key.clone(), format!("bulk://{key}")))
            .collect())
    }

    async fn upload_image_from_url(&self, _url: &str, key: &str) -> Result<String> {
        Ok(format!("thumb://{key}"))
    }
}
