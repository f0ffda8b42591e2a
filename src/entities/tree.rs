//! Tree entity - the physical tree record.
//!
//! The gifting engine only ever touches the assignment and gifting metadata
//! of a tree; planting, monitoring and inventory selection live elsewhere.
//! A tree id maps to at most one live gift card at a time.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tree database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trees")]
pub struct Model {
    /// Unique identifier for the tree
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-facing sapling tag, used in artifact keys and dashboards
    #[sea_orm(unique)]
    pub sapling_id: String,
    /// Species name, used to pick the card template
    pub plant_type: String,
    /// Plot the tree is planted in
    pub plot_id: i64,
    /// Sponsor user the tree is reserved for
    pub mapped_to_user: Option<i64>,
    /// Sponsor group the tree is reserved for
    pub mapped_to_group: Option<i64>,
    /// When the tree was reserved
    pub mapped_at: Option<DateTimeUtc>,
    /// Sponsoring user recorded at reservation time
    pub sponsored_by_user: Option<i64>,
    /// Sponsoring group recorded at reservation time
    pub sponsored_by_group: Option<i64>,
    /// User the tree is assigned (delivered) to; a live value here makes the
    /// binding immutable for reconciliation
    pub assigned_to: Option<i64>,
    /// When the tree was assigned
    pub assigned_at: Option<DateTimeUtc>,
    /// User the tree is gifted to, None for internal assignments
    pub gifted_to: Option<i64>,
    /// Sponsoring user the gift is from, None for internal assignments
    pub gifted_by: Option<i64>,
    /// Display name of the gifter
    pub gifted_by_name: Option<String>,
    /// Display name of the planter, cleared on gifting
    pub planted_by: Option<String>,
    /// Occasion description inherited from the request
    pub description: Option<String>,
    /// Occasion code inherited from the request
    pub event_type: Option<String>,
    /// Recipient profile image shown on the tree's dashboard page
    pub user_tree_image: Option<String>,
    /// Shared memory-album image URLs (JSON array)
    pub memory_images: Option<Json>,
    /// Creation timestamp
    pub created_at: DateTimeUtc,
    /// Last update timestamp
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between the tree and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// A tree may back at most one gift card
    #[sea_orm(has_many = "super::gift_card::Entity")]
    GiftCards,
}

impl Related<super::gift_card::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GiftCards.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
