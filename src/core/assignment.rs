//! Tree delivery to recipients.
//!
//! Reconciliation decides which slot belongs to which recipient; this module
//! pushes that decision onto the tree records. Entries are walked in
//! creation order and each entry's tree-bound slots are delivered first-fit,
//! so repeated runs converge without ever reassigning a delivered tree.

use crate::core::concurrency::run_with_concurrency;
use crate::core::status::refresh_request_status;
use crate::entities::{
    GiftCard, GiftRequestUser, Tree, User, gift_card, gift_card_request, gift_request_user, tree,
    user,
};
use crate::errors::{Error, Result};
use chrono::{NaiveTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{info, warn};

/// Trees delivered concurrently per run.
const ASSIGN_CONCURRENCY: usize = 10;

/// One pending delivery: a slot and the tree to patch for it.
struct PendingDelivery {
    tree: tree::Model,
    recipient: i64,
    assignee: i64,
    profile_image_url: Option<String>,
}

/// Delivers the reserved trees of a request to their reconciled recipients.
///
/// Only slots carrying both a tree and a recipient entry are touched, and a
/// tree already delivered is skipped, so the operation is idempotent.
/// Internal requests (`request_type == "Normal Assignment"`) carry no
/// gifting metadata and stamp today's date; gifted requests stamp the
/// request's `gifted_on` date and the gifter identity.
///
/// Returns the number of trees delivered in this run.
pub async fn auto_assign_trees(
    db: &DatabaseConnection,
    request: &gift_card_request::Model,
    memory_images: Option<Vec<String>>,
) -> Result<u64> {
    let entries = GiftRequestUser::find()
        .filter(gift_request_user::Column::GiftRequestId.eq(request.id))
        .order_by_asc(gift_request_user::Column::Id)
        .all(db)
        .await?;

    let memory_images_json = memory_images.map(|urls| serde_json::json!(urls));

    link_free_slots(db, request.id, &entries).await?;

    let mut deliveries = Vec::new();
    for entry in &entries {
        let slots = GiftCard::find()
            .filter(gift_card::Column::GiftCardRequestId.eq(request.id))
            .filter(gift_card::Column::GiftRequestUserId.eq(entry.id))
            .filter(gift_card::Column::TreeId.is_not_null())
            .order_by_asc(gift_card::Column::Id)
            .find_also_related(Tree)
            .all(db)
            .await?;

        for (_, found) in slots {
            let Some(found) = found else { continue };
            if found.assigned_to.is_some() {
                continue;
            }
            deliveries.push(PendingDelivery {
                tree: found,
                recipient: entry.recipient,
                assignee: entry.assignee,
                profile_image_url: entry.profile_image_url.clone(),
            });
        }
    }

    let delivered = deliveries.len() as u64;
    let tasks: Vec<_> = deliveries
        .into_iter()
        .map(|delivery| deliver_tree(db, request, delivery, memory_images_json.clone()))
        .collect();
    for result in run_with_concurrency(tasks, ASSIGN_CONCURRENCY).await {
        result?;
    }

    refresh_request_status(db, request.id).await?;

    if delivered > 0 {
        info!(request_id = request.id, delivered, "assigned trees to recipients");
    }
    Ok(delivered)
}

/// First-fit links unlinked tree-bound slots into entries still short of
/// their target count. Already-linked slots are never relinked.
async fn link_free_slots(
    db: &DatabaseConnection,
    request_id: i64,
    entries: &[gift_request_user::Model],
) -> Result<()> {
    let free = GiftCard::find()
        .filter(gift_card::Column::GiftCardRequestId.eq(request_id))
        .filter(gift_card::Column::GiftRequestUserId.is_null())
        .filter(gift_card::Column::TreeId.is_not_null())
        .order_by_asc(gift_card::Column::Id)
        .all(db)
        .await?;
    if free.is_empty() {
        return Ok(());
    }

    let mut free = free.into_iter();
    let now = Utc::now();
    for entry in entries {
        let linked = GiftCard::find()
            .filter(gift_card::Column::GiftRequestUserId.eq(entry.id))
            .count(db)
            .await?;
        let mut needed = (entry.gifted_trees.max(0) as u64).saturating_sub(linked);

        while needed > 0 {
            let Some(slot) = free.next() else {
                return Ok(());
            };
            let mut active: gift_card::ActiveModel = slot.into();
            active.gift_request_user_id = Set(Some(entry.id));
            active.gifted_to = Set(Some(entry.recipient));
            active.assigned_to = Set(Some(entry.assignee));
            active.profile_image_url = Set(entry.profile_image_url.clone());
            active.updated_at = Set(now);
            active.update(db).await?;
            needed -= 1;
        }
    }

    Ok(())
}

/// Applies the delivery patch to one tree.
async fn deliver_tree(
    db: &DatabaseConnection,
    request: &gift_card_request::Model,
    delivery: PendingDelivery,
    memory_images: Option<serde_json::Value>,
) -> Result<()> {
    let internal = request.request_type == "Normal Assignment";
    let assigned_at = if internal {
        Utc::now()
    } else {
        request.gifted_on.and_time(NaiveTime::MIN).and_utc()
    };

    let mut active: tree::ActiveModel = delivery.tree.into();
    active.assigned_to = Set(Some(delivery.assignee));
    active.assigned_at = Set(Some(assigned_at));
    if internal {
        active.gifted_to = Set(None);
        active.gifted_by = Set(None);
        active.gifted_by_name = Set(None);
    } else {
        active.gifted_to = Set(Some(delivery.recipient));
        active.gifted_by = Set(Some(request.user_id));
        active.gifted_by_name = Set(request.planted_by.clone());
    }
    active.planted_by = Set(None);
    active.description = Set(request.event_name.clone());
    active.event_type = Set(request.event_type.clone());
    active.user_tree_image = Set(delivery.profile_image_url);
    active.memory_images = Set(memory_images);
    active.updated_at = Set(Utc::now());
    active.update(db).await?;

    Ok(())
}

/// One recipient entry edit: identity details for the recipient and
/// assignee, and the profile image applied to the entry's cards and trees.
#[derive(Debug, Clone, Default)]
pub struct RecipientDetailsEdit {
    /// Recipient entry to edit
    pub entry_id: i64,
    /// New recipient display name
    pub recipient_name: Option<String>,
    /// New recipient email
    pub recipient_email: Option<String>,
    /// New recipient phone
    pub recipient_phone: Option<String>,
    /// New assignee display name
    pub assignee_name: Option<String>,
    /// New assignee email
    pub assignee_email: Option<String>,
    /// New assignee phone
    pub assignee_phone: Option<String>,
    /// Profile image for the entry, its cards and its delivered trees
    pub profile_image_url: Option<String>,
}

/// Applies recipient detail edits, counting failures instead of aborting.
///
/// Each edit rewrites the recipient's (and, when different, the assignee's)
/// user record, stores the entry's profile image, and propagates the image
/// to the entry's cards and to trees delivered to the assignee. A failing
/// edit is logged and counted; the rest of the batch still runs. Returns the
/// number of failed edits.
pub async fn update_recipient_details(
    db: &DatabaseConnection,
    edits: &[RecipientDetailsEdit],
) -> Result<u64> {
    let mut failures = 0;
    for edit in edits {
        if let Err(err) = apply_recipient_edit(db, edit).await {
            warn!(entry_id = edit.entry_id, error = %err, "recipient details update failed");
            failures += 1;
        }
    }
    Ok(failures)
}

async fn apply_recipient_edit(db: &DatabaseConnection, edit: &RecipientDetailsEdit) -> Result<()> {
    let entry = GiftRequestUser::find_by_id(edit.entry_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::Validation {
            message: format!("Recipient entry {} not found", edit.entry_id),
            fields: vec!["entry_id".to_string()],
        })?;

    update_user_identity(
        db,
        entry.recipient,
        edit.recipient_name.as_deref(),
        edit.recipient_email.as_deref(),
        edit.recipient_phone.as_deref(),
    )
    .await?;
    if entry.assignee != entry.recipient {
        update_user_identity(
            db,
            entry.assignee,
            edit.assignee_name.as_deref(),
            edit.assignee_email.as_deref(),
            edit.assignee_phone.as_deref(),
        )
        .await?;
    }

    let now = Utc::now();
    GiftRequestUser::update_many()
        .set(gift_request_user::ActiveModel {
            profile_image_url: Set(edit.profile_image_url.clone()),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(gift_request_user::Column::Id.eq(entry.id))
        .exec(db)
        .await?;

    let slots = GiftCard::find()
        .filter(gift_card::Column::GiftRequestUserId.eq(entry.id))
        .all(db)
        .await?;
    let tree_ids: Vec<i64> = slots.iter().filter_map(|s| s.tree_id).collect();

    GiftCard::update_many()
        .set(gift_card::ActiveModel {
            profile_image_url: Set(edit.profile_image_url.clone()),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(gift_card::Column::GiftRequestUserId.eq(entry.id))
        .exec(db)
        .await?;

    if !tree_ids.is_empty() {
        Tree::update_many()
            .set(tree::ActiveModel {
                user_tree_image: Set(edit.profile_image_url.clone()),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(tree::Column::Id.is_in(tree_ids))
            .filter(tree::Column::AssignedTo.eq(entry.assignee))
            .exec(db)
            .await?;
    }

    Ok(())
}

/// Rewrites the set identity fields of one user record.
async fn update_user_identity(
    db: &DatabaseConnection,
    user_id: i64,
    name: Option<&str>,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<()> {
    let found = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::Validation {
            message: format!("User {user_id} not found"),
            fields: vec!["user_id".to_string()],
        })?;

    let mut active: user::ActiveModel = found.into();
    if let Some(name) = name {
        active.name = Set(name.to_string());
    }
    if let Some(email) = email {
        active.email = Set(email.to_string());
    }
    if let Some(phone) = phone {
        active.phone = Set(Some(phone.to_string()));
    }
    active.updated_at = Set(Utc::now());
    active.update(db).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::reconcile::{RecipientTarget, reconcile_card_slots};
    use crate::core::request::{create_gift_card_request, get_request, upsert_user};
    use crate::test_utils::{
        create_booked_slot, create_test_request, create_test_tree, setup_test_db,
        test_request_input,
    };

    fn target(recipient: i64, count: u64) -> RecipientTarget {
        RecipientTarget {
            recipient,
            assignee: recipient,
            count,
            profile_image_url: None,
            relation: None,
        }
    }

    async fn seed_booked(db: &DatabaseConnection, request_id: i64, n: usize) -> Result<()> {
        for i in 0..n {
            let tree = create_test_tree(db, &format!("SAP-{request_id}-{i}"), "Neem", 1).await?;
            create_booked_slot(db, request_id, Some(tree.id)).await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_delivers_all_trees_and_advances_status() -> Result<()> {
        let db = setup_test_db().await?;
        let request = create_test_request(&db, 4).await?;
        seed_booked(&db, request.id, 4).await?;
        reconcile_card_slots(&db, request.id, &[target(1, 2), target(2, 2)]).await?;

        let request = get_request(&db, request.id).await?;
        let delivered = auto_assign_trees(&db, &request, None).await?;
        assert_eq!(delivered, 4);

        let trees = Tree::find().all(&db).await?;
        assert_eq!(trees.iter().filter(|t| t.assigned_to == Some(1)).count(), 2);
        assert_eq!(trees.iter().filter(|t| t.assigned_to == Some(2)).count(), 2);
        for found in &trees {
            assert_eq!(found.gifted_by, Some(request.user_id));
            assert_eq!(found.gifted_to, found.assigned_to);
            assert!(found.assigned_at.is_some());
        }

        let reloaded = get_request(&db, request.id).await?;
        assert_eq!(reloaded.status, "pending_gift_cards");

        Ok(())
    }

    #[tokio::test]
    async fn test_second_run_delivers_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let request = create_test_request(&db, 2).await?;
        seed_booked(&db, request.id, 2).await?;
        reconcile_card_slots(&db, request.id, &[target(1, 2)]).await?;

        let request = get_request(&db, request.id).await?;
        assert_eq!(auto_assign_trees(&db, &request, None).await?, 2);

        let before: Vec<_> = Tree::find().all(&db).await?;
        assert_eq!(auto_assign_trees(&db, &request, None).await?, 0);
        let after: Vec<_> = Tree::find().all(&db).await?;

        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.assigned_at, b.assigned_at);
            assert_eq!(a.assigned_to, b.assigned_to);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_internal_assignment_carries_no_gifting_metadata() -> Result<()> {
        let db = setup_test_db().await?;
        let mut input = test_request_input(1);
        input.request_type = "Normal Assignment".to_string();
        let request = create_gift_card_request(&db, input).await?;
        seed_booked(&db, request.id, 1).await?;
        reconcile_card_slots(&db, request.id, &[target(1, 1)]).await?;

        let request = get_request(&db, request.id).await?;
        auto_assign_trees(&db, &request, None).await?;

        let found = Tree::find().one(&db).await?.unwrap();
        assert_eq!(found.assigned_to, Some(1));
        assert!(found.gifted_to.is_none());
        assert!(found.gifted_by.is_none());
        assert!(found.gifted_by_name.is_none());
        // Internal assignments stamp the current date, not gifted_on
        assert!(found.assigned_at.unwrap() > request.gifted_on.and_time(NaiveTime::MIN).and_utc());

        Ok(())
    }

    #[tokio::test]
    async fn test_memory_images_written_to_trees() -> Result<()> {
        let db = setup_test_db().await?;
        let request = create_test_request(&db, 1).await?;
        seed_booked(&db, request.id, 1).await?;
        reconcile_card_slots(&db, request.id, &[target(1, 1)]).await?;

        let request = get_request(&db, request.id).await?;
        let images = vec!["https://cdn.example/a.jpg".to_string()];
        auto_assign_trees(&db, &request, Some(images.clone())).await?;

        let found = Tree::find().one(&db).await?.unwrap();
        assert_eq!(found.memory_images, Some(serde_json::json!(images)));

        Ok(())
    }

    #[tokio::test]
    async fn test_links_free_tree_slots_into_short_entries() -> Result<()> {
        let db = setup_test_db().await?;
        let request = create_test_request(&db, 2).await?;

        let entry = gift_request_user::ActiveModel {
            gift_request_id: Set(request.id),
            recipient: Set(7),
            assignee: Set(7),
            gifted_trees: Set(2),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        // Trees booked after the entry existed: the slots carry no entry yet.
        seed_booked(&db, request.id, 2).await?;

        let request = get_request(&db, request.id).await?;
        let delivered = auto_assign_trees(&db, &request, None).await?;
        assert_eq!(delivered, 2);

        let slots = GiftCard::find().all(&db).await?;
        assert!(slots.iter().all(|s| s.gift_request_user_id == Some(entry.id)));
        assert!(slots.iter().all(|s| s.gifted_to == Some(7)));

        Ok(())
    }

    #[tokio::test]
    async fn test_update_recipient_details_propagates_identity_and_image() -> Result<()> {
        let db = setup_test_db().await?;
        let request = create_test_request(&db, 1).await?;
        seed_booked(&db, request.id, 1).await?;
        let jane = upsert_user(&db, "Jane Doe", "jane@example.com", None).await?;
        reconcile_card_slots(&db, request.id, &[target(jane.id, 1)]).await?;
        let request = get_request(&db, request.id).await?;
        auto_assign_trees(&db, &request, None).await?;

        let entry = GiftRequestUser::find().one(&db).await?.unwrap();
        let url = Some("https://cdn.example/jane.jpg".to_string());
        let failures = update_recipient_details(
            &db,
            &[RecipientDetailsEdit {
                entry_id: entry.id,
                recipient_name: Some("Jane A. Doe".to_string()),
                profile_image_url: url.clone(),
                ..Default::default()
            }],
        )
        .await?;
        assert_eq!(failures, 0);

        let reloaded = User::find_by_id(jane.id).one(&db).await?.unwrap();
        assert_eq!(reloaded.name, "Jane A. Doe");
        let slot = GiftCard::find().one(&db).await?.unwrap();
        assert_eq!(slot.profile_image_url, url);
        let found = Tree::find().one(&db).await?.unwrap();
        assert_eq!(found.user_tree_image, url);

        Ok(())
    }

    #[tokio::test]
    async fn test_update_recipient_details_counts_failures() -> Result<()> {
        let db = setup_test_db().await?;
        let request = create_test_request(&db, 1).await?;
        seed_booked(&db, request.id, 1).await?;
        let jane = upsert_user(&db, "Jane Doe", "jane@example.com", None).await?;
        reconcile_card_slots(&db, request.id, &[target(jane.id, 1)]).await?;

        let entry = GiftRequestUser::find().one(&db).await?.unwrap();
        let failures = update_recipient_details(
            &db,
            &[
                RecipientDetailsEdit {
                    entry_id: 9999,
                    recipient_name: Some("Nobody".to_string()),
                    ..Default::default()
                },
                RecipientDetailsEdit {
                    entry_id: entry.id,
                    recipient_email: Some("jane.doe@example.com".to_string()),
                    ..Default::default()
                },
            ],
        )
        .await?;

        // The bad edit is counted, the good one still lands
        assert_eq!(failures, 1);
        let reloaded = User::find_by_id(jane.id).one(&db).await?.unwrap();
        assert_eq!(reloaded.email, "jane.doe@example.com");

        Ok(())
    }
}
