//! Gift card request entity - A sponsor's purchase order for N gift cards.
//!
//! The request drives the whole fulfillment lifecycle: plot selection, tree
//! reservation, recipient assignment and artifact generation. Booked and
//! assigned counts are derived from the linked gift cards, never stored.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Gift card request database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gift_card_requests")]
pub struct Model {
    /// Unique identifier for the request
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Public, unguessable request identifier used in artifact keys
    #[sea_orm(unique)]
    pub request_id: String,
    /// Sponsoring user id
    pub user_id: i64,
    /// Optional sponsoring group (corporate) id
    pub group_id: Option<i64>,
    /// Number of gift cards purchased
    pub no_of_cards: i64,
    /// Pricing category (e.g. "Public", "Foundation"); does not affect allocation
    pub category: String,
    /// Kind of request: "Cards Request", "Normal Assignment" or "Visit"
    pub request_type: String,
    /// Lifecycle status, string form of [`crate::core::status::RequestStatus`]
    pub status: String,
    /// Whether trees have been reserved against this request
    pub is_active: bool,
    /// Occasion code ("1" birthday, "2" memorial, ...) inherited by trees
    pub event_type: Option<String>,
    /// Occasion name shown on trees and cards
    pub event_name: Option<String>,
    /// Display name of the person the gift is from
    pub planted_by: Option<String>,
    /// Nominal gifting date used for non-internal assignments
    pub gifted_on: Date,
    /// Primary message template for card personalization
    pub primary_message: Option<String>,
    /// Secondary message printed below the primary one
    pub secondary_message: Option<String>,
    /// Sponsor/company logo image URL
    pub logo_url: Option<String>,
    /// Text accompanying the logo
    pub logo_message: Option<String>,
    /// Outstanding validation flag (e.g. `MISSING_USER_DETAILS`), None when clean
    pub validation_error: Option<String>,
    /// Admin user who first processed the request
    pub processed_by: Option<i64>,
    /// Creation timestamp
    pub created_at: DateTimeUtc,
    /// Last update timestamp
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between the request and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One request owns many gift card slots
    #[sea_orm(has_many = "super::gift_card::Entity")]
    GiftCards,
    /// One request owns many recipient entries
    #[sea_orm(has_many = "super::gift_request_user::Entity")]
    GiftRequestUsers,
    /// One request sources trees from many plots
    #[sea_orm(has_many = "super::gift_card_plot::Entity")]
    GiftCardPlots,
}

impl Related<super::gift_card::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GiftCards.def()
    }
}

impl Related<super::gift_request_user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GiftRequestUsers.def()
    }
}

impl Related<super::gift_card_plot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GiftCardPlots.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
