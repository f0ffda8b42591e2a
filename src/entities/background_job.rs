//! Background job entity - durable record for fire-and-forget pipelines.
//!
//! The HTTP boundary acknowledges a request immediately and enqueues a job
//! row; a worker claims and runs it, so the outcome of a long artifact run is
//! operator-visible instead of vanishing with a detached task.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Background job database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "background_jobs")]
pub struct Model {
    /// Unique identifier for the job
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Request this job operates on
    pub gift_card_request_id: i64,
    /// Job kind (e.g. "generate_gift_cards")
    pub job_type: String,
    /// Job status: "pending", "running", "completed" or "failed"
    pub status: String,
    /// Last error message for failed jobs
    pub error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTimeUtc,
    /// Last update timestamp
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between the job and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each job targets exactly one request
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
