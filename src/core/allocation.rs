//! Tree reservation against a gift card request.
//!
//! Reservation fills the gap between the purchased card count and the trees
//! already booked. The inventory collaborator owns tree selection; this
//! module owns slot bookkeeping, sponsor mapping on the tree records, donor
//! group membership and the resulting status move.

use crate::core::request::{get_plot_ids, get_request};
use crate::core::status::{RequestCounts, RequestStatus, derive_status};
use crate::entities::{GiftCard, Tree, gift_card, gift_card_request, tree};
use crate::entities::{GiftCardPlot, gift_card_plot};
use crate::errors::{Error, Result};
use crate::external::{DonorGroups, ReserveTreesQuery, TreeInventory};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::info;

/// Flags steering inventory selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReserveOptions {
    /// Spread the selection across species and plots
    pub diversify: bool,
    /// Allow trees not flagged as giftable
    pub include_non_giftable: bool,
    /// Allow all habits (shrubs, climbers, ...)
    pub include_all_habits: bool,
}

/// What a reservation run achieved.
///
/// `reserved < requested` is partial fulfilment, reported rather than
/// raised; the caller decides whether to retry with more plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingOutcome {
    /// Trees the request still needed
    pub requested: u64,
    /// Trees actually reserved in this run
    pub reserved: u64,
}

/// Reserves trees from the configured plots to fill the request's deficit.
///
/// Existing tree-less card slots are filled oldest-first before new slots
/// are created, so slots freed by reconciliation get reused. The sponsor
/// joins the donor group whenever at least one tree was reserved.
pub async fn reserve_trees(
    db: &DatabaseConnection,
    inventory: &dyn TreeInventory,
    donor_groups: &dyn DonorGroups,
    request_id: i64,
    options: ReserveOptions,
    processed_by: Option<i64>,
) -> Result<BookingOutcome> {
    let request = get_request(db, request_id).await?;

    let plot_ids = get_plot_ids(db, request_id).await?;
    if plot_ids.is_empty() {
        return Err(Error::PlotsNotConfigured { request_id });
    }

    let counts = RequestCounts::load(db, &request).await?;
    let deficit = counts.purchased.saturating_sub(counts.booked);
    if deficit == 0 {
        return Ok(BookingOutcome {
            requested: 0,
            reserved: 0,
        });
    }

    let mut tree_ids = inventory
        .reserve_trees(ReserveTreesQuery {
            sponsor_id: request.user_id,
            group_id: request.group_id,
            plot_ids,
            count: deficit,
            include_non_giftable: options.include_non_giftable,
            diversify: options.diversify,
            include_all_habits: options.include_all_habits,
        })
        .await?;
    tree_ids.truncate(deficit as usize);

    if tree_ids.is_empty() {
        return Err(Error::TreesNotAvailable { requested: deficit });
    }

    map_trees_to_sponsor(db, &request, &tree_ids).await?;
    bind_trees_to_slots(db, request_id, &tree_ids).await?;

    donor_groups.add_user_to_donor_group(request.user_id).await?;

    finalize_booking(db, request, processed_by).await?;

    info!(request_id, requested = deficit, reserved = tree_ids.len(), "reserved trees");
    Ok(BookingOutcome {
        requested: deficit,
        reserved: tree_ids.len() as u64,
    })
}

/// Books caller-chosen trees instead of querying the inventory.
///
/// Trees already booked under a different request are rejected before any
/// mutation, and trees beyond the request's remaining deficit are dropped,
/// so a booking can never exceed the purchased card count.
pub async fn book_specific_trees(
    db: &DatabaseConnection,
    donor_groups: &dyn DonorGroups,
    request_id: i64,
    tree_ids: &[i64],
) -> Result<BookingOutcome> {
    let request = get_request(db, request_id).await?;

    let existing = GiftCard::find()
        .filter(gift_card::Column::TreeId.is_in(tree_ids.to_vec()))
        .all(db)
        .await?;
    if existing.iter().any(|c| c.gift_card_request_id != request_id) {
        return Err(Error::TreesAlreadyBooked { request_id });
    }

    let counts = RequestCounts::load(db, &request).await?;
    let deficit = counts.purchased.saturating_sub(counts.booked);

    let already_bound: Vec<i64> = existing.iter().filter_map(|c| c.tree_id).collect();
    let mut fresh: Vec<i64> = tree_ids
        .iter()
        .copied()
        .filter(|id| !already_bound.contains(id))
        .collect();
    fresh.truncate(deficit as usize);

    if !fresh.is_empty() {
        map_trees_to_sponsor(db, &request, &fresh).await?;
        bind_trees_to_slots(db, request_id, &fresh).await?;
        donor_groups.add_user_to_donor_group(request.user_id).await?;
    }

    let reserved = fresh.len() as u64;
    finalize_booking(db, request, None).await?;

    Ok(BookingOutcome {
        requested: tree_ids.len() as u64,
        reserved,
    })
}

/// Administrative unbook: releases trees, deletes their card slots and plot
/// assignments, and resets the request to `pending_plot_selection`.
///
/// This is the only operation that moves a request's status backward.
pub async fn unbook_trees(
    db: &DatabaseConnection,
    request_id: i64,
    tree_ids: Option<&[i64]>,
    unmap_all: bool,
) -> Result<()> {
    let request = get_request(db, request_id).await?;

    let mut query = GiftCard::find()
        .filter(gift_card::Column::GiftCardRequestId.eq(request_id))
        .filter(gift_card::Column::TreeId.is_not_null());
    if !unmap_all {
        let Some(ids) = tree_ids else {
            return reset_request_to_plot_selection(db, request).await;
        };
        query = query.filter(gift_card::Column::TreeId.is_in(ids.to_vec()));
    }
    let slots = query.all(db).await?;

    let released: Vec<i64> = slots.iter().filter_map(|s| s.tree_id).collect();
    if !released.is_empty() {
        Tree::update_many()
            .set(release_patch())
            .filter(tree::Column::Id.is_in(released.clone()))
            .exec(db)
            .await?;

        let slot_ids: Vec<i64> = slots.iter().map(|s| s.id).collect();
        GiftCard::delete_many()
            .filter(gift_card::Column::Id.is_in(slot_ids))
            .exec(db)
            .await?;

        info!(request_id, released = released.len(), "unbooked trees");
    }

    reset_request_to_plot_selection(db, request).await
}

/// Tree patch applied at reservation time: maps the tree to the sponsor.
async fn map_trees_to_sponsor(
    db: &DatabaseConnection,
    request: &gift_card_request::Model,
    tree_ids: &[i64],
) -> Result<()> {
    let now = Utc::now();
    Tree::update_many()
        .set(tree::ActiveModel {
            mapped_to_user: Set(Some(request.user_id)),
            mapped_to_group: Set(request.group_id),
            mapped_at: Set(Some(now)),
            sponsored_by_user: Set(Some(request.user_id)),
            sponsored_by_group: Set(request.group_id),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(tree::Column::Id.is_in(tree_ids.to_vec()))
        .exec(db)
        .await?;
    Ok(())
}

/// Tree patch applied at unbook time: clears every gifting field the engine
/// ever wrote.
fn release_patch() -> tree::ActiveModel {
    tree::ActiveModel {
        mapped_to_user: Set(None),
        mapped_to_group: Set(None),
        mapped_at: Set(None),
        sponsored_by_user: Set(None),
        sponsored_by_group: Set(None),
        assigned_to: Set(None),
        assigned_at: Set(None),
        gifted_to: Set(None),
        gifted_by: Set(None),
        gifted_by_name: Set(None),
        planted_by: Set(None),
        description: Set(None),
        event_type: Set(None),
        user_tree_image: Set(None),
        memory_images: Set(None),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
}

/// Fills tree-less slots oldest-first, then creates new slots for leftover
/// tree ids.
async fn bind_trees_to_slots(
    db: &DatabaseConnection,
    request_id: i64,
    tree_ids: &[i64],
) -> Result<()> {
    let empty_slots = GiftCard::find()
        .filter(gift_card::Column::GiftCardRequestId.eq(request_id))
        .filter(gift_card::Column::TreeId.is_null())
        .order_by_asc(gift_card::Column::Id)
        .all(db)
        .await?;

    let now = Utc::now();
    let mut remaining = tree_ids.iter().copied();

    for slot in empty_slots {
        let Some(tree_id) = remaining.next() else {
            break;
        };
        let mut active: gift_card::ActiveModel = slot.into();
        active.tree_id = Set(Some(tree_id));
        active.updated_at = Set(now);
        active.update(db).await?;
    }

    for tree_id in remaining {
        let slot = gift_card::ActiveModel {
            gift_card_request_id: Set(request_id),
            tree_id: Set(Some(tree_id)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        slot.insert(db).await?;
    }

    Ok(())
}

/// Recomputes status after a booking run and records the processing admin.
async fn finalize_booking(
    db: &DatabaseConnection,
    request: gift_card_request::Model,
    processed_by: Option<i64>,
) -> Result<()> {
    let counts = RequestCounts::load(db, &request).await?;
    let current = RequestStatus::parse(&request.status)?;
    let next = derive_status(current, &counts);

    let had_processor = request.processed_by.is_some();
    let mut active: gift_card_request::ActiveModel = request.into();
    active.status = Set(next.as_str().to_string());
    active.is_active = Set(true);
    if let (false, Some(admin)) = (had_processor, processed_by) {
        active.processed_by = Set(Some(admin));
    }
    active.updated_at = Set(Utc::now());
    active.update(db).await?;

    Ok(())
}

/// Deletes plot assignments and resets the lifecycle to plot selection.
async fn reset_request_to_plot_selection(
    db: &DatabaseConnection,
    request: gift_card_request::Model,
) -> Result<()> {
    let request_id = request.id;

    GiftCardPlot::delete_many()
        .filter(gift_card_plot::Column::GiftCardRequestId.eq(request_id))
        .exec(db)
        .await?;

    let mut active: gift_card_request::ActiveModel = request.into();
    active.status = Set(RequestStatus::PendingPlotSelection.as_str().to_string());
    active.is_active = Set(false);
    active.updated_at = Set(Utc::now());
    active.update(db).await?;

    Ok(())
}
