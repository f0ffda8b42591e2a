//! Gift request user entity - a named recipient's target tree allocation.
//!
//! The recipient and assignee may differ ("gift to A, deliver message as B").
//! The fulfilled count of an entry is the number of gift cards referencing it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Recipient entry database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gift_request_users")]
pub struct Model {
    /// Unique identifier for the recipient entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning gift card request
    pub gift_request_id: i64,
    /// User id receiving the gift
    pub recipient: i64,
    /// User id the trees are assigned to (may equal `recipient`)
    pub assignee: i64,
    /// Relation of the assignee to the recipient ("son", "aunt", "other", ...)
    pub relation: Option<String>,
    /// Number of trees this recipient should receive
    pub gifted_trees: i64,
    /// Profile image applied to the recipient's trees and cards
    pub profile_image_url: Option<String>,
    /// Whether the recipient mail went out
    pub mail_sent: Option<bool>,
    /// Last mail error for the recipient, None on success
    pub mail_error: Option<String>,
    /// Whether the assignee mail went out
    pub mail_sent_assignee: Option<bool>,
    /// Creation timestamp
    pub created_at: DateTimeUtc,
    /// Last update timestamp
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between the recipient entry and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each recipient entry belongs to exactly one request
    #[sea_orm(
        belongs_to = "super::gift_card_request::Entity",
        from = "Column::GiftRequestId",
        to = "super::gift_card_request::Column::Id"
    )]
    GiftCardRequest,
    /// Many cards may count towards one recipient entry
    #[sea_orm(has_many = "super::gift_card::Entity")]
    GiftCards,
}

impl Related<super::gift_card_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GiftCardRequest.def()
    }
}

impl Related<super::gift_card::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GiftCards.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
