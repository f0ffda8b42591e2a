//! User entity - sponsors, recipients and assignees.
//!
//! Only the identity fields the gifting engine needs; account management
//! lives outside this crate.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Full display name
    pub name: String,
    /// Email address, unique per user
    #[sea_orm(unique)]
    pub email: String,
    /// Phone number
    pub phone: Option<String>,
    /// Creation timestamp
    pub created_at: DateTimeUtc,
    /// Last update timestamp
    pub updated_at: DateTimeUtc,
}

/// No owned relations; referenced by id from requests, cards and recipients
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
