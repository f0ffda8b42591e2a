//! Gift request lifecycle - creation, patching, plot assignment, deletion.
//!
//! Provides the synchronous portion of the request flow; the heavy lifting
//! (reservation, reconciliation, rendering) lives in the sibling modules.

use crate::core::{allocation, assignment, jobs, reconcile, status::RequestStatus};
use crate::entities::{
    GiftCard, GiftCardPlot, GiftCardRequest, GiftRequestUser, User, gift_card, gift_card_plot,
    gift_card_request, gift_request_user, user,
};
use crate::errors::{Error, Result};
use crate::external::{DonorGroups, TreeInventory};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::info;
use uuid::Uuid;

/// Validation flags a request can carry while incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFlag {
    /// Sponsor logo is missing
    MissingLogo,
    /// Recipient tree counts do not match the purchased card count
    MissingUserDetails,
}

impl ValidationFlag {
    /// Stored string form of the flag.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingLogo => "MISSING_LOGO",
            Self::MissingUserDetails => "MISSING_USER_DETAILS",
        }
    }
}

/// Input for creating a new gift card request.
#[derive(Debug, Clone)]
pub struct CreateRequestInput {
    /// Sponsoring user id
    pub user_id: i64,
    /// Optional sponsoring group id
    pub group_id: Option<i64>,
    /// Number of cards purchased
    pub no_of_cards: i64,
    /// Pricing category
    pub category: String,
    /// Request kind ("Cards Request", "Normal Assignment", "Visit")
    pub request_type: String,
    /// Occasion code
    pub event_type: Option<String>,
    /// Occasion name
    pub event_name: Option<String>,
    /// Display name of the gifter
    pub planted_by: Option<String>,
    /// Nominal gifting date
    pub gifted_on: NaiveDate,
    /// Primary message template
    pub primary_message: Option<String>,
    /// Secondary message
    pub secondary_message: Option<String>,
    /// Sponsor logo URL
    pub logo_url: Option<String>,
    /// Logo line text
    pub logo_message: Option<String>,
}

/// Explicit partial update for a request; only set fields are written.
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    /// New occasion name
    pub event_name: Option<String>,
    /// New occasion code
    pub event_type: Option<String>,
    /// New gifter display name
    pub planted_by: Option<String>,
    /// New gifting date
    pub gifted_on: Option<NaiveDate>,
    /// New primary message template
    pub primary_message: Option<String>,
    /// New secondary message
    pub secondary_message: Option<String>,
    /// New logo URL
    pub logo_url: Option<String>,
    /// New logo line
    pub logo_message: Option<String>,
    /// New pricing category
    pub category: Option<String>,
}

/// Loads a request by id.
pub async fn get_request(
    db: &DatabaseConnection,
    request_id: i64,
) -> Result<gift_card_request::Model> {
    GiftCardRequest::find_by_id(request_id)
        .one(db)
        .await?
        .ok_or(Error::RequestNotFound { id: request_id })
}

/// Finds a user by email, creating or renaming as needed.
pub async fn upsert_user(
    db: &DatabaseConnection,
    name: &str,
    email: &str,
    phone: Option<&str>,
) -> Result<user::Model> {
    if let Some(existing) = User::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await?
    {
        if existing.name == name && (phone.is_none() || existing.phone.as_deref() == phone) {
            return Ok(existing);
        }

        let mut active: user::ActiveModel = existing.into();
        active.name = Set(name.to_string());
        if let Some(phone) = phone {
            active.phone = Set(Some(phone.to_string()));
        }
        active.updated_at = Set(Utc::now());
        return Ok(active.update(db).await?);
    }

    let now = Utc::now();
    let created = user::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        phone: Set(phone.map(ToString::to_string)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(created.insert(db).await?)
}

/// Creates a new gift card request in `pending_plot_selection`.
pub async fn create_gift_card_request(
    db: &DatabaseConnection,
    input: CreateRequestInput,
) -> Result<gift_card_request::Model> {
    let mut fields = Vec::new();
    if input.no_of_cards <= 0 {
        fields.push("no_of_cards".to_string());
    }
    if input.request_type.trim().is_empty() {
        fields.push("request_type".to_string());
    }
    if !fields.is_empty() {
        return Err(Error::Validation {
            message: "Invalid gift card request input".to_string(),
            fields,
        });
    }

    let now = Utc::now();
    let request = gift_card_request::ActiveModel {
        request_id: Set(Uuid::new_v4().simple().to_string()),
        user_id: Set(input.user_id),
        group_id: Set(input.group_id),
        no_of_cards: Set(input.no_of_cards),
        category: Set(input.category),
        request_type: Set(input.request_type),
        status: Set(RequestStatus::PendingPlotSelection.as_str().to_string()),
        is_active: Set(false),
        event_type: Set(input.event_type),
        event_name: Set(input.event_name),
        planted_by: Set(input.planted_by),
        gifted_on: Set(input.gifted_on),
        primary_message: Set(input.primary_message),
        secondary_message: Set(input.secondary_message),
        logo_url: Set(input.logo_url),
        logo_message: Set(input.logo_message),
        validation_error: Set(None),
        processed_by: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let created = request.insert(db).await?;
    info!(request_id = created.id, cards = created.no_of_cards, "created gift card request");
    Ok(created)
}

/// Applies a partial update to a request via explicit field merge.
pub async fn apply_request_patch(
    db: &DatabaseConnection,
    request_id: i64,
    patch: RequestPatch,
) -> Result<gift_card_request::Model> {
    let request = get_request(db, request_id).await?;
    let mut active: gift_card_request::ActiveModel = request.into();

    if let Some(event_name) = patch.event_name {
        active.event_name = Set(Some(event_name));
    }
    if let Some(event_type) = patch.event_type {
        active.event_type = Set(Some(event_type));
    }
    if let Some(planted_by) = patch.planted_by {
        active.planted_by = Set(Some(planted_by));
    }
    if let Some(gifted_on) = patch.gifted_on {
        active.gifted_on = Set(gifted_on);
    }
    if let Some(primary_message) = patch.primary_message {
        active.primary_message = Set(Some(primary_message));
    }
    if let Some(secondary_message) = patch.secondary_message {
        active.secondary_message = Set(Some(secondary_message));
    }
    if let Some(logo_url) = patch.logo_url {
        active.logo_url = Set(Some(logo_url));
    }
    if let Some(logo_message) = patch.logo_message {
        active.logo_message = Set(Some(logo_message));
    }
    if let Some(category) = patch.category {
        active.category = Set(category);
    }
    active.updated_at = Set(Utc::now());

    Ok(active.update(db).await?)
}

/// Replaces the plot assignments of a request.
pub async fn assign_plots(
    db: &DatabaseConnection,
    request_id: i64,
    plot_ids: &[i64],
) -> Result<()> {
    get_request(db, request_id).await?;

    GiftCardPlot::delete_many()
        .filter(gift_card_plot::Column::GiftCardRequestId.eq(request_id))
        .exec(db)
        .await?;

    let now = Utc::now();
    for plot_id in plot_ids {
        let row = gift_card_plot::ActiveModel {
            gift_card_request_id: Set(request_id),
            plot_id: Set(*plot_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        row.insert(db).await?;
    }

    Ok(())
}

/// Returns the plot ids assigned to a request, in assignment order.
pub async fn get_plot_ids(db: &DatabaseConnection, request_id: i64) -> Result<Vec<i64>> {
    let plots = GiftCardPlot::find()
        .filter(gift_card_plot::Column::GiftCardRequestId.eq(request_id))
        .order_by_asc(gift_card_plot::Column::Id)
        .all(db)
        .await?;
    Ok(plots.into_iter().map(|p| p.plot_id).collect())
}

/// Sets or clears a validation flag on the request.
///
/// Only one flag is stored at a time; setting replaces any previous one and
/// clearing only removes the named flag.
pub async fn update_validation_flag(
    db: &DatabaseConnection,
    request_id: i64,
    flag: ValidationFlag,
    present: bool,
) -> Result<()> {
    let request = get_request(db, request_id).await?;
    let current = request.validation_error.clone();
    let mut active: gift_card_request::ActiveModel = request.into();

    if present {
        active.validation_error = Set(Some(flag.as_str().to_string()));
    } else if current.as_deref() == Some(flag.as_str()) {
        active.validation_error = Set(None);
    } else {
        return Ok(());
    }

    active.updated_at = Set(Utc::now());
    active.update(db).await?;
    Ok(())
}

/// Deletes a request and its dependent rows.
///
/// Refused while any card still holds a tree; callers must unbook first so a
/// reserved tree is never orphaned.
pub async fn delete_request(db: &DatabaseConnection, request_id: i64) -> Result<()> {
    get_request(db, request_id).await?;

    let booked = GiftCard::find()
        .filter(gift_card::Column::GiftCardRequestId.eq(request_id))
        .filter(gift_card::Column::TreeId.is_not_null())
        .count(db)
        .await?;
    if booked > 0 {
        return Err(Error::Validation {
            message: format!("Request {request_id} still has {booked} trees booked; unbook first"),
            fields: vec!["tree_id".to_string()],
        });
    }

    GiftCard::delete_many()
        .filter(gift_card::Column::GiftCardRequestId.eq(request_id))
        .exec(db)
        .await?;
    GiftRequestUser::delete_many()
        .filter(gift_request_user::Column::GiftRequestId.eq(request_id))
        .exec(db)
        .await?;
    GiftCardPlot::delete_many()
        .filter(gift_card_plot::Column::GiftCardRequestId.eq(request_id))
        .exec(db)
        .await?;
    GiftCardRequest::delete_by_id(request_id).exec(db).await?;

    info!(request_id, "deleted gift card request");
    Ok(())
}

/// One recipient in an end-to-end gifting flow.
#[derive(Debug, Clone)]
pub struct RecipientInput {
    /// Recipient display name
    pub name: String,
    /// Recipient email
    pub email: String,
    /// Recipient phone
    pub phone: Option<String>,
    /// Trees this recipient should receive
    pub trees_count: i64,
}

/// Payload for the end-to-end messaging-flow entry point.
#[derive(Debug, Clone)]
pub struct ProcessGiftRequestInput {
    /// Sponsor display name
    pub sponsor_name: String,
    /// Sponsor email
    pub sponsor_email: String,
    /// Total trees purchased
    pub trees_count: i64,
    /// Occasion code
    pub event_type: Option<String>,
    /// Occasion name
    pub event_name: Option<String>,
    /// Display name of the gifter
    pub gifted_by: String,
    /// Gifting date
    pub gifted_on: NaiveDate,
    /// Primary message template
    pub primary_message: String,
    /// Secondary message
    pub secondary_message: String,
    /// Plots to source trees from
    pub plot_ids: Vec<i64>,
    /// Named recipients
    pub recipients: Vec<RecipientInput>,
}

/// Runs the full gifting flow used by the messaging boundary: create the
/// request and recipients, reserve trees, assign them, and enqueue artifact
/// generation as a background job.
///
/// Returns the created request id. Artifact rendering runs asynchronously;
/// the caller observes it via the request status and job record.
pub async fn process_gift_request(
    db: &DatabaseConnection,
    inventory: &dyn TreeInventory,
    donor_groups: &dyn DonorGroups,
    input: ProcessGiftRequestInput,
) -> Result<i64> {
    let sponsor = upsert_user(db, &input.sponsor_name, &input.sponsor_email, None).await?;

    let request = create_gift_card_request(
        db,
        CreateRequestInput {
            user_id: sponsor.id,
            group_id: None,
            no_of_cards: input.trees_count,
            category: "Public".to_string(),
            request_type: "Cards Request".to_string(),
            event_type: input.event_type,
            event_name: input.event_name,
            planted_by: Some(input.gifted_by),
            gifted_on: input.gifted_on,
            primary_message: Some(input.primary_message),
            secondary_message: Some(input.secondary_message),
            logo_url: None,
            logo_message: Some(crate::core::personalize::DEFAULT_LOGO_MESSAGE.to_string()),
        },
    )
    .await?;

    assign_plots(db, request.id, &input.plot_ids).await?;

    let outcome = allocation::reserve_trees(
        db,
        inventory,
        donor_groups,
        request.id,
        allocation::ReserveOptions {
            diversify: true,
            include_non_giftable: false,
            include_all_habits: false,
        },
        None,
    )
    .await?;
    info!(
        request_id = request.id,
        requested = outcome.requested,
        reserved = outcome.reserved,
        "reserved trees for gift request"
    );

    let mut targets = Vec::new();
    for recipient in &input.recipients {
        let user = upsert_user(db, &recipient.name, &recipient.email, recipient.phone.as_deref())
            .await?;
        targets.push(reconcile::RecipientTarget {
            recipient: user.id,
            assignee: user.id,
            count: recipient.trees_count as u64,
            profile_image_url: None,
            relation: None,
        });
    }
    reconcile::reconcile_card_slots(db, request.id, &targets).await?;

    let request = get_request(db, request.id).await?;
    assignment::auto_assign_trees(db, &request, None).await?;

    jobs::enqueue_job(db, request.id, jobs::JobType::GenerateGiftCards).await?;

    Ok(request.id)
}
