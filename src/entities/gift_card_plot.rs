//! Gift card plot entity - plot assignments for sourcing trees.
//!
//! Each row links a request to one plot the inventory may reserve trees from.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Plot assignment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gift_card_plots")]
pub struct Model {
    /// Unique identifier for the assignment row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning gift card request
    pub gift_card_request_id: i64,
    /// Plot the request may source trees from
    pub plot_id: i64,
    /// Creation timestamp
    pub created_at: DateTimeUtc,
    /// Last update timestamp
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between the plot assignment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each plot assignment belongs to exactly one request
    #[sea_orm(
        belongs_to = "super::gift_card_request::Entity",
        from = "Column::GiftCardRequestId",
        to = "super::gift_card_request::Column::Id"
    )]
    GiftCardRequest,
}

impl Related<super::gift_card_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GiftCardRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
