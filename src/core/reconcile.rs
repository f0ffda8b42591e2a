//! Minimum-disruption reconciliation of card slots against recipient targets.
//!
//! Editing recipients never rebuilds the slot set from scratch. A pure
//! planning pass compares the current slots with the desired targets and
//! emits the smallest set of binds, creates, resets and deletes; the apply
//! pass runs the plan in one transaction. Slots whose tree has already been
//! delivered to someone are never disturbed - the whole run aborts before
//! any mutation instead.

use crate::core::request::{ValidationFlag, get_request, update_validation_flag};
use crate::entities::{
    GiftCard, GiftRequestUser, Tree, gift_card, gift_request_user,
};
use crate::errors::{Error, Result};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*};
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::info;

/// Desired allocation for one recipient/assignee pair.
#[derive(Debug, Clone)]
pub struct RecipientTarget {
    /// User id receiving the gift
    pub recipient: i64,
    /// User id the trees are assigned to (may equal `recipient`)
    pub assignee: i64,
    /// Trees this pair should end up with
    pub count: u64,
    /// Profile image applied to the pair's cards
    pub profile_image_url: Option<String>,
    /// Relation of the assignee to the recipient
    pub relation: Option<String>,
}

/// Point-in-time view of one card slot, as the planner sees it.
#[derive(Debug, Clone, Copy)]
pub struct SlotSnapshot {
    /// Slot id
    pub id: i64,
    /// Currently bound recipient/assignee pair, None if in the free pool
    pub entry: Option<(i64, i64)>,
    /// Whether a tree is bound to the slot
    pub has_tree: bool,
    /// Whether the slot carries a profile image
    pub has_image: bool,
    /// Whether the bound tree has already been delivered to its assignee
    pub delivered: bool,
}

/// Mutations a reconciliation run will perform.
///
/// Indices in `bind` and `create` refer into the targets slice the plan was
/// computed from.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// Existing free slots to bind, as (slot id, target index)
    pub bind: Vec<(i64, usize)>,
    /// New slots to create, one target index per slot
    pub create: Vec<usize>,
    /// Tree-bound slots to return to the free pool
    pub reset: Vec<i64>,
    /// Recipient-only slots to delete outright
    pub delete: Vec<i64>,
}

impl ReconcilePlan {
    /// True when the run would not touch anything.
    pub fn is_empty(&self) -> bool {
        self.bind.is_empty() && self.create.is_empty() && self.reset.is_empty()
            && self.delete.is_empty()
    }
}

/// Computes the minimum-disruption plan for moving `slots` to `targets`.
///
/// Per pair, currently bound slots are kept up to the target count,
/// preferring delivered slots, then slots with an image, then tree-bound
/// slots, ties broken by slot id. Surplus tree-bound slots return to the
/// free pool; surplus recipient-only slots are deleted. Shortfalls top up
/// from the free pool (tree-bound slots first, then by slot id) and only
/// create new slots once the pool runs dry.
///
/// Fails with [`Error::CardsAlreadyAssigned`] if any delivered slot would be
/// unbound, so a delivered card is never silently reshuffled.
pub fn plan_reconciliation(
    request_id: i64,
    slots: &[SlotSnapshot],
    targets: &[RecipientTarget],
) -> Result<ReconcilePlan> {
    let target_index: HashMap<(i64, i64), usize> = targets
        .iter()
        .enumerate()
        .map(|(i, t)| ((t.recipient, t.assignee), i))
        .collect();

    let mut bound: HashMap<(i64, i64), Vec<&SlotSnapshot>> = HashMap::new();
    let mut free: Vec<&SlotSnapshot> = Vec::new();
    for slot in slots {
        match slot.entry {
            Some(pair) => bound.entry(pair).or_default().push(slot),
            None => free.push(slot),
        }
    }

    let mut plan = ReconcilePlan::default();
    let mut kept = vec![0u64; targets.len()];

    for (pair, mut group) in bound {
        group.sort_by_key(|s| (Reverse(s.delivered), Reverse(s.has_image), Reverse(s.has_tree), s.id));

        let keep = match target_index.get(&pair) {
            Some(&i) => {
                let keep = (targets[i].count as usize).min(group.len());
                kept[i] = keep as u64;
                keep
            }
            None => 0,
        };

        for &slot in &group[keep..] {
            if slot.delivered {
                return Err(Error::CardsAlreadyAssigned { request_id });
            }
            if slot.has_tree {
                plan.reset.push(slot.id);
                free.push(slot);
            } else {
                plan.delete.push(slot.id);
            }
        }
    }

    free.sort_by_key(|s| (Reverse(s.has_tree), s.id));
    let mut pool = free.into_iter();

    for (i, target) in targets.iter().enumerate() {
        let mut needed = target.count.saturating_sub(kept[i]);
        while needed > 0 {
            match pool.next() {
                Some(slot) => plan.bind.push((slot.id, i)),
                None => plan.create.push(i),
            }
            needed -= 1;
        }
    }

    // A reset slot consumed by a later bind needs no separate reset
    let rebound: Vec<i64> = plan.bind.iter().map(|(id, _)| *id).collect();
    plan.reset.retain(|id| !rebound.contains(id));

    Ok(plan)
}

/// Reconciles the card slots of a request against the given targets.
///
/// Upserts the recipient entries, applies the plan in one transaction, drops
/// entries no longer targeted, and recomputes the `MISSING_USER_DETAILS`
/// validation flag from the covered counts. Running twice with the same
/// targets is a no-op the second time.
pub async fn reconcile_card_slots(
    db: &DatabaseConnection,
    request_id: i64,
    targets: &[RecipientTarget],
) -> Result<()> {
    let request = get_request(db, request_id).await?;

    let entries = GiftRequestUser::find()
        .filter(gift_request_user::Column::GiftRequestId.eq(request_id))
        .all(db)
        .await?;
    let entry_pairs: HashMap<i64, (i64, i64)> = entries
        .iter()
        .map(|e| (e.id, (e.recipient, e.assignee)))
        .collect();

    let slots = GiftCard::find()
        .filter(gift_card::Column::GiftCardRequestId.eq(request_id))
        .find_also_related(Tree)
        .all(db)
        .await?;
    let snapshots: Vec<SlotSnapshot> = slots
        .iter()
        .map(|(card, tree)| SlotSnapshot {
            id: card.id,
            entry: card
                .gift_request_user_id
                .and_then(|id| entry_pairs.get(&id).copied()),
            has_tree: card.tree_id.is_some(),
            has_image: card.profile_image_url.is_some(),
            delivered: tree.as_ref().is_some_and(|t| t.assigned_to.is_some()),
        })
        .collect();

    let plan = plan_reconciliation(request_id, &snapshots, targets)?;

    let txn = db.begin().await?;
    let now = Utc::now();

    let mut entry_ids = Vec::with_capacity(targets.len());
    for target in targets {
        let existing = entries
            .iter()
            .find(|e| e.recipient == target.recipient && e.assignee == target.assignee);
        let id = match existing {
            Some(model) => {
                let mut active: gift_request_user::ActiveModel = model.clone().into();
                active.gifted_trees = Set(target.count as i64);
                active.profile_image_url = Set(target.profile_image_url.clone());
                active.relation = Set(target.relation.clone());
                active.updated_at = Set(now);
                active.update(&txn).await?.id
            }
            None => {
                let created = gift_request_user::ActiveModel {
                    gift_request_id: Set(request_id),
                    recipient: Set(target.recipient),
                    assignee: Set(target.assignee),
                    relation: Set(target.relation.clone()),
                    gifted_trees: Set(target.count as i64),
                    profile_image_url: Set(target.profile_image_url.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                created.insert(&txn).await?.id
            }
        };
        entry_ids.push(id);
    }

    if !plan.reset.is_empty() {
        GiftCard::update_many()
            .set(gift_card::ActiveModel {
                gift_request_user_id: Set(None),
                gifted_to: Set(None),
                assigned_to: Set(None),
                profile_image_url: Set(None),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(gift_card::Column::Id.is_in(plan.reset.clone()))
            .exec(&txn)
            .await?;
    }

    if !plan.delete.is_empty() {
        GiftCard::delete_many()
            .filter(gift_card::Column::Id.is_in(plan.delete.clone()))
            .exec(&txn)
            .await?;
    }

    for (slot_id, i) in &plan.bind {
        GiftCard::update_many()
            .set(gift_card::ActiveModel {
                gift_request_user_id: Set(Some(entry_ids[*i])),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(gift_card::Column::Id.eq(*slot_id))
            .exec(&txn)
            .await?;
    }

    for &i in &plan.create {
        let slot = gift_card::ActiveModel {
            gift_card_request_id: Set(request_id),
            gift_request_user_id: Set(Some(entry_ids[i])),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        slot.insert(&txn).await?;
    }

    // Recipient fields follow the entry, including on slots kept as-is, so
    // a changed profile image reaches every card of the pair
    for (i, target) in targets.iter().enumerate() {
        GiftCard::update_many()
            .set(gift_card::ActiveModel {
                gifted_to: Set(Some(target.recipient)),
                assigned_to: Set(Some(target.assignee)),
                profile_image_url: Set(target.profile_image_url.clone()),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(gift_card::Column::GiftRequestUserId.eq(entry_ids[i]))
            .exec(&txn)
            .await?;
    }

    let stale: Vec<i64> = entries
        .iter()
        .filter(|e| !entry_ids.contains(&e.id))
        .map(|e| e.id)
        .collect();
    if !stale.is_empty() {
        GiftRequestUser::delete_many()
            .filter(gift_request_user::Column::Id.is_in(stale))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    // Over-covered distributions are as wrong as under-covered ones
    let covered: u64 = targets.iter().map(|t| t.count).sum();
    update_validation_flag(
        db,
        request_id,
        ValidationFlag::MissingUserDetails,
        covered != request.no_of_cards as u64,
    )
    .await?;

    info!(
        request_id,
        bound = plan.bind.len(),
        created = plan.create.len(),
        reset = plan.reset.len(),
        deleted = plan.delete.len(),
        "reconciled card slots"
    );
    Ok(())
}
