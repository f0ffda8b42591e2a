//! Plant type template entity - species to card-template mapping.
//!
//! Cards whose tree species has no template row are skipped by the artifact
//! pipeline rather than failed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Plant type template database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plant_type_templates")]
pub struct Model {
    /// Unique identifier for the mapping
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Species name as stored on trees
    #[sea_orm(unique)]
    pub plant_type: String,
    /// Slide template id in the master presentation
    pub template_id: String,
    /// Creation timestamp
    pub created_at: DateTimeUtc,
    /// Last update timestamp
    pub updated_at: DateTimeUtc,
}

/// No relations; looked up by plant type only
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
