//! Gift card entity - one reservable card slot within a request.
//!
//! A slot starts empty, gets a tree bound during reservation, a recipient and
//! assignee during reconciliation or auto-assignment, and finally the
//! rendered artifact identifiers (slide, presentation, image URL).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Gift card slot database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gift_cards")]
pub struct Model {
    /// Unique identifier for the card slot
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning gift card request
    pub gift_card_request_id: i64,
    /// Recipient entry this slot counts towards, None while unassigned
    pub gift_request_user_id: Option<i64>,
    /// Physical tree bound to this card, None until reserved
    pub tree_id: Option<i64>,
    /// User id the tree is gifted to
    pub gifted_to: Option<i64>,
    /// User id the tree is assigned to (may equal `gifted_to`)
    pub assigned_to: Option<i64>,
    /// Recipient profile image shown on the card
    pub profile_image_url: Option<String>,
    /// Rendered card artifact URL
    pub card_image_url: Option<String>,
    /// Slide id of the rendered card within its presentation
    pub slide_id: Option<String>,
    /// Presentation the rendered slide belongs to
    pub presentation_id: Option<String>,
    /// Whether the recipient mail for this card went out
    pub mail_sent: Option<bool>,
    /// Creation timestamp
    pub created_at: DateTimeUtc,
    /// Last update timestamp
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between the gift card and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each card belongs to exactly one request
    #[sea_orm(
        belongs_to = "super::gift_card_request::Entity",
        from = "Column::GiftCardRequestId",
        to = "super::gift_card_request::Column::Id"
    )]
    GiftCardRequest,
    /// Each card counts towards at most one recipient entry
    #[sea_orm(
        belongs_to = "super::gift_request_user::Entity",
        from = "Column::GiftRequestUserId",
        to = "super::gift_request_user::Column::Id"
    )]
    GiftRequestUser,
    /// Each card is bound to at most one tree
    #[sea_orm(
        belongs_to = "super::tree::Entity",
        from = "Column::TreeId",
        to = "super::tree::Column::Id"
    )]
    Tree,
}

impl Related<super::gift_card_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GiftCardRequest.def()
    }
}

impl Related<super::gift_request_user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GiftRequestUser.def()
    }
}

impl Related<super::tree::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tree.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
