//! Card artifact generation.
//!
//! Cards are rendered by duplicating per-species template slides into copies
//! of the master presentation (one copy per batch of 200 cards), bulk
//! substituting the personalized text, exporting the whole presentation as a
//! PDF and storing one page image per card. When a bulk export fails, the
//! batch degrades to per-card thumbnail rendering with retry instead of
//! failing the run.

use crate::core::concurrency::{RetryPolicy, retry_with_backoff, run_with_concurrency};
use crate::core::personalize::{
    DEFAULT_BIRTHDAY_MESSAGE, DEFAULT_LOGO_MESSAGE, DEFAULT_MEMORIAL_MESSAGE,
    DEFAULT_PRIMARY_MESSAGE, DEFAULT_SECONDARY_MESSAGE, MEMORIAL_EVENT_TYPE,
    personalized_message, pluralized_message,
};
use crate::core::request::{ValidationFlag, get_request, update_validation_flag};
use crate::core::status::refresh_request_status;
use crate::entities::{
    GiftCard, GiftRequestUser, PlantTypeTemplate, Tree, User, gift_card, gift_card_request,
    gift_request_user, plant_type_template, user,
};
use crate::errors::{Error, Result};
use crate::external::{ArtifactStorage, SlideRecord, SlideTemplateApi};
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Cards per presentation copy.
const BATCH_SIZE: usize = 200;
/// Presentation copies created concurrently.
const PRESENTATION_CONCURRENCY: usize = 10;
/// Card image URL writes run concurrently after a bulk export.
const PERSIST_CONCURRENCY: usize = 20;
/// Per-card thumbnail renders run concurrently in the fallback path.
const THUMBNAIL_CONCURRENCY: usize = 3;

/// Species used when a card has no tree to take one from.
pub const DEFAULT_PLANT_TYPE: &str = "Chinch (चिंच)";

/// One card waiting to be rendered.
#[derive(Debug, Clone)]
struct CardJob {
    slot_id: i64,
    sapling: String,
    template_id: String,
    record: SlideRecord,
}

/// Renders card artifacts for every unrendered, tree-bound card of a
/// request.
///
/// Cards whose species has no template are skipped with a warning. A failed
/// bulk export degrades that batch to the thumbnail fallback; only the cards
/// that fail both paths stay unrendered, which keeps the request out of
/// `completed` until a later run succeeds.
pub async fn generate_gift_cards(
    db: &DatabaseConnection,
    slides: &dyn SlideTemplateApi,
    storage: &dyn ArtifactStorage,
    template_presentation_id: &str,
    request_id: i64,
) -> Result<()> {
    let request = get_request(db, request_id).await?;

    update_validation_flag(
        db,
        request_id,
        ValidationFlag::MissingLogo,
        request.logo_url.is_none(),
    )
    .await?;

    let booked = GiftCard::find()
        .filter(gift_card::Column::GiftCardRequestId.eq(request_id))
        .filter(gift_card::Column::TreeId.is_not_null())
        .find_also_related(Tree)
        .all(db)
        .await?;

    // Plural phrasing keys on the trees actually bound per pair, which can
    // be fewer than the entry's target under partial booking
    let mut pair_counts: HashMap<(i64, i64), u64> = HashMap::new();
    for (card, _) in &booked {
        if let (Some(to), Some(assigned)) = (card.gifted_to, card.assigned_to) {
            *pair_counts.entry((to, assigned)).or_insert(0) += 1;
        }
    }

    let mut slots: Vec<_> = booked
        .into_iter()
        .filter(|(card, _)| card.card_image_url.is_none())
        .collect();
    // Recipient-less cards sort last so finished presentations group the
    // named cards together
    slots.sort_by_key(|(card, _)| (card.gift_request_user_id.is_none(), card.id));

    if slots.is_empty() {
        refresh_request_status(db, request_id).await?;
        return Ok(());
    }

    let entries: HashMap<i64, gift_request_user::Model> = GiftRequestUser::find()
        .filter(gift_request_user::Column::GiftRequestId.eq(request_id))
        .all(db)
        .await?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();
    let users = load_user_names(db, &entries).await?;
    let sponsor_name = User::find_by_id(request.user_id)
        .one(db)
        .await?
        .map(|u| u.name)
        .unwrap_or_default();
    let gifted_by = request
        .planted_by
        .clone()
        .unwrap_or_else(|| sponsor_name.clone());

    let templates: HashMap<String, String> = PlantTypeTemplate::find()
        .all(db)
        .await?
        .into_iter()
        .map(|t| (t.plant_type, t.template_id))
        .collect();

    let mut jobs = Vec::new();
    for (card, found) in slots {
        let Some(found) = found else { continue };
        let Some(template_id) = templates.get(&found.plant_type) else {
            warn!(
                slot_id = card.id,
                plant_type = %found.plant_type,
                "no card template for species; skipping card"
            );
            continue;
        };

        let entry = card.gift_request_user_id.and_then(|id| entries.get(&id));
        let tree_count = card
            .gifted_to
            .zip(card.assigned_to)
            .and_then(|pair| pair_counts.get(&pair).copied())
            .unwrap_or(1);
        let record = build_record(&request, &found.sapling_id, entry, &users, tree_count, &gifted_by);
        jobs.push(CardJob {
            slot_id: card.id,
            sapling: found.sapling_id,
            template_id: template_id.clone(),
            record,
        });
    }

    if jobs.is_empty() {
        refresh_request_status(db, request_id).await?;
        return Ok(());
    }

    let mut batches: Vec<Vec<CardJob>> = Vec::new();
    let mut jobs = jobs.into_iter().peekable();
    while jobs.peek().is_some() {
        batches.push(jobs.by_ref().take(BATCH_SIZE).collect());
    }

    let names: Vec<String> = (1..=batches.len())
        .map(|n| format!("{sponsor_name}-[{}] ({n})", request.request_id))
        .collect();
    let tasks: Vec<_> = names
        .iter()
        .map(|name| slides.duplicate_presentation(template_presentation_id, name))
        .collect();
    let presentations: Vec<String> = run_with_concurrency(tasks, PRESENTATION_CONCURRENCY)
        .await
        .into_iter()
        .collect::<Result<_>>()?;

    for (batch, presentation_id) in batches.iter_mut().zip(&presentations) {
        fill_presentation(db, slides, presentation_id, batch).await?;
    }

    for (batch, presentation_id) in batches.iter().zip(&presentations) {
        export_batch(db, slides, storage, &request.request_id, presentation_id, batch).await?;
    }

    let status = refresh_request_status(db, request_id).await?;
    info!(
        request_id,
        batches = batches.len(),
        status = status.as_str(),
        "generated gift card artifacts"
    );
    Ok(())
}

/// Renders one card on demand, outside the batch pipeline.
///
/// Used for previews and re-renders of a single slot; a slot without a tree
/// falls back to the default species template. Returns the stored image URL.
pub async fn generate_single_card(
    db: &DatabaseConnection,
    slides: &dyn SlideTemplateApi,
    storage: &dyn ArtifactStorage,
    template_presentation_id: &str,
    slot_id: i64,
) -> Result<String> {
    let slot = GiftCard::find_by_id(slot_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::Validation {
            message: format!("Gift card {slot_id} not found"),
            fields: vec!["id".to_string()],
        })?;
    let request = get_request(db, slot.gift_card_request_id).await?;

    let found = match slot.tree_id {
        Some(id) => Tree::find_by_id(id).one(db).await?,
        None => None,
    };
    let plant_type = found
        .as_ref()
        .map_or(DEFAULT_PLANT_TYPE, |t| t.plant_type.as_str());
    let template = lookup_template(db, plant_type).await?;

    let entry = match slot.gift_request_user_id {
        Some(id) => GiftRequestUser::find_by_id(id).one(db).await?,
        None => None,
    };
    let users = match &entry {
        Some(entry) => {
            let mut map = HashMap::new();
            map.insert(entry.id, entry.clone());
            load_user_names(db, &map).await?
        }
        None => HashMap::new(),
    };

    let tree_count = match slot.gift_request_user_id {
        Some(id) => GiftCard::find()
            .filter(gift_card::Column::GiftRequestUserId.eq(id))
            .filter(gift_card::Column::TreeId.is_not_null())
            .count(db)
            .await?
            .max(1),
        None => 1,
    };
    let gifted_by = match request.planted_by.clone() {
        Some(name) => name,
        None => User::find_by_id(request.user_id)
            .one(db)
            .await?
            .map(|u| u.name)
            .unwrap_or_default(),
    };

    let sapling = found
        .as_ref()
        .map_or_else(|| format!("slot-{slot_id}"), |t| t.sapling_id.clone());
    let mut record =
        build_record(&request, &sapling, entry.as_ref(), &users, tree_count, &gifted_by);

    let presentation_id = slides
        .duplicate_presentation(
            template_presentation_id,
            &format!("card-[{}]-{slot_id}", request.request_id),
        )
        .await?;
    let slide_ids = slides
        .duplicate_slides(&presentation_id, &[template.template_id])
        .await?;
    let slide_id = slide_ids.first().ok_or(Error::ExternalService {
        service: "slides",
        message: "slide duplication returned no slides".to_string(),
    })?;
    record.slide_id = slide_id.clone();
    slides.bulk_update_slides(&presentation_id, std::slice::from_ref(&record)).await?;
    slides.delete_unused_slides(&presentation_id, &slide_ids).await?;

    let thumb = retry_with_backoff("slide thumbnail", RetryPolicy::default(), || {
        slides.slide_thumbnail_url(&presentation_id, slide_id)
    })
    .await?;
    let key = format!("cards/{}/thumbnails/{sapling}.jpg", request.request_id);
    let url = storage.upload_image_from_url(&thumb, &key).await?;

    let mut active: gift_card::ActiveModel = slot.into();
    active.slide_id = Set(Some(slide_id.clone()));
    active.presentation_id = Set(Some(presentation_id));
    active.card_image_url = Set(Some(url.clone()));
    active.updated_at = Set(Utc::now());
    active.update(db).await?;

    Ok(url)
}

/// Duplicates and personalizes the slides of one batch.
async fn fill_presentation(
    db: &DatabaseConnection,
    slides: &dyn SlideTemplateApi,
    presentation_id: &str,
    batch: &mut [CardJob],
) -> Result<()> {
    let template_ids: Vec<String> = batch.iter().map(|j| j.template_id.clone()).collect();
    let slide_ids = slides.duplicate_slides(presentation_id, &template_ids).await?;

    let now = Utc::now();
    for (job, slide_id) in batch.iter_mut().zip(&slide_ids) {
        job.record.slide_id = slide_id.clone();
        GiftCard::update_many()
            .set(gift_card::ActiveModel {
                slide_id: Set(Some(slide_id.clone())),
                presentation_id: Set(Some(presentation_id.to_string())),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(gift_card::Column::Id.eq(job.slot_id))
            .exec(db)
            .await?;
    }

    let records: Vec<SlideRecord> = batch.iter().map(|j| j.record.clone()).collect();
    slides.bulk_update_slides(presentation_id, &records).await?;
    slides.delete_unused_slides(presentation_id, &slide_ids).await?;
    slides.reorder_slides(presentation_id, &slide_ids).await?;

    Ok(())
}

/// Exports one batch as a PDF and persists the page images, degrading to the
/// per-card thumbnail fallback for any card the export did not cover.
async fn export_batch(
    db: &DatabaseConnection,
    slides: &dyn SlideTemplateApi,
    storage: &dyn ArtifactStorage,
    request_key: &str,
    presentation_id: &str,
    batch: &[CardJob],
) -> Result<()> {
    let keys: Vec<String> = batch
        .iter()
        .map(|j| format!("{request_key}/{}.png", j.sapling))
        .collect();

    let stored = match slides.export_presentation(presentation_id, "application/pdf").await {
        Ok(pdf) => match storage.store_pdf_pages(&pdf, &keys).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(presentation_id, error = %err, "storing exported pages failed");
                HashMap::new()
            }
        },
        Err(err) => {
            warn!(presentation_id, error = %err, "bulk presentation export failed");
            HashMap::new()
        }
    };

    let mut persist = Vec::new();
    let mut fallback = Vec::new();
    for (job, key) in batch.iter().zip(&keys) {
        match stored.get(key) {
            Some(url) => persist.push(persist_card_image(db, job.slot_id, url.clone())),
            None => fallback.push(job),
        }
    }

    for result in run_with_concurrency(persist, PERSIST_CONCURRENCY).await {
        result?;
    }

    if !fallback.is_empty() {
        warn!(
            presentation_id,
            cards = fallback.len(),
            "falling back to per-card thumbnail rendering"
        );
        let tasks: Vec<_> = fallback
            .iter()
            .map(|job| render_thumbnail(db, slides, storage, request_key, presentation_id, job))
            .collect();
        for result in run_with_concurrency(tasks, THUMBNAIL_CONCURRENCY).await {
            if let Err(err) = result {
                warn!(presentation_id, error = %err, "thumbnail fallback failed for card");
            }
        }
    }

    Ok(())
}

/// Renders one card via the slide thumbnail endpoint, with retry.
async fn render_thumbnail(
    db: &DatabaseConnection,
    slides: &dyn SlideTemplateApi,
    storage: &dyn ArtifactStorage,
    request_key: &str,
    presentation_id: &str,
    job: &CardJob,
) -> Result<()> {
    let slide_id = job.record.slide_id.clone();
    let thumb = retry_with_backoff("slide thumbnail", RetryPolicy::default(), || {
        slides.slide_thumbnail_url(presentation_id, &slide_id)
    })
    .await?;

    let key = format!("cards/{request_key}/thumbnails/{}.jpg", job.sapling);
    let url = storage.upload_image_from_url(&thumb, &key).await?;
    persist_card_image(db, job.slot_id, url).await
}

async fn persist_card_image(db: &DatabaseConnection, slot_id: i64, url: String) -> Result<()> {
    GiftCard::update_many()
        .set(gift_card::ActiveModel {
            card_image_url: Set(Some(url)),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(gift_card::Column::Id.eq(slot_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Loads display names for every user referenced by the recipient entries.
async fn load_user_names(
    db: &DatabaseConnection,
    entries: &HashMap<i64, gift_request_user::Model>,
) -> Result<HashMap<i64, String>> {
    let user_ids: HashSet<i64> = entries
        .values()
        .flat_map(|e| [e.recipient, e.assignee])
        .collect();
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }

    Ok(User::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect())
}

/// Finds the template for a species, falling back to the default species.
async fn lookup_template(
    db: &DatabaseConnection,
    plant_type: &str,
) -> Result<plant_type_template::Model> {
    if let Some(template) = PlantTypeTemplate::find()
        .filter(plant_type_template::Column::PlantType.eq(plant_type))
        .one(db)
        .await?
    {
        return Ok(template);
    }

    PlantTypeTemplate::find()
        .filter(plant_type_template::Column::PlantType.eq(DEFAULT_PLANT_TYPE))
        .one(db)
        .await?
        .ok_or_else(|| Error::Validation {
            message: format!("No card template configured for species {plant_type}"),
            fields: vec!["plant_type".to_string()],
        })
}

/// Builds the personalized slide text for one card.
///
/// A card whose trees are assigned in someone else's name rewrites the
/// message around the assignee; the recipient's own card keeps "your".
/// Pairs with more than one bound tree get the pluralized phrasing, and the
/// `{recipient}`/`{giftedBy}` markers are substituted last.
fn build_record(
    request: &gift_card_request::Model,
    sapling: &str,
    entry: Option<&gift_request_user::Model>,
    users: &HashMap<i64, String>,
    tree_count: u64,
    gifted_by: &str,
) -> SlideRecord {
    let base = request
        .primary_message
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| default_primary_message(request.event_type.as_deref()).to_string());

    let (name, mut message) = match entry {
        Some(entry) => {
            let recipient_name = users.get(&entry.recipient).cloned().unwrap_or_default();

            let mut message = base;
            if entry.assignee != entry.recipient {
                let assignee_name = users.get(&entry.assignee).cloned().unwrap_or_default();
                message = personalized_message(
                    &message,
                    &assignee_name,
                    request.event_type.as_deref(),
                    entry.relation.as_deref(),
                );
            }
            if tree_count > 1 {
                message = pluralized_message(&message, tree_count);
            }
            (recipient_name, message)
        }
        None => (String::new(), base),
    };

    if !name.is_empty() {
        message = message.replacen("{recipient}", &name, 1);
    }
    if !gifted_by.is_empty() {
        message = message.replacen("{giftedBy}", gifted_by, 1);
    }

    SlideRecord {
        slide_id: String::new(),
        name,
        sapling: sapling.to_string(),
        primary_message: message,
        secondary_message: request
            .secondary_message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SECONDARY_MESSAGE.to_string()),
        logo_url: request.logo_url.clone(),
        logo_message: request
            .logo_message
            .clone()
            .or_else(|| Some(DEFAULT_LOGO_MESSAGE.to_string())),
    }
}

/// Default primary message for the given occasion code.
fn default_primary_message(event_type: Option<&str>) -> &'static str {
    match event_type {
        Some("1") => DEFAULT_BIRTHDAY_MESSAGE,
        Some(MEMORIAL_EVENT_TYPE) => DEFAULT_MEMORIAL_MESSAGE,
        _ => DEFAULT_PRIMARY_MESSAGE,
    }
}
