//! Durable background jobs.
//!
//! Long-running work (artifact generation) is acknowledged immediately and
//! recorded as a job row instead of running on a detached task; a worker
//! claims pending jobs one at a time and persists the outcome, so failures
//! stay operator-visible and can be retried by re-enqueueing.

use crate::core::artifact;
use crate::entities::{BackgroundJob, background_job};
use crate::errors::{Error, Result};
use crate::external::{ArtifactStorage, SlideTemplateApi};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use std::time::Duration;
use tracing::{error, info, warn};

/// Kinds of background work the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    /// Render the card artifacts of a request
    GenerateGiftCards,
}

impl JobType {
    /// Stored string form of the job type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GenerateGiftCards => "generate_gift_cards",
        }
    }

    /// Parses the stored string form.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "generate_gift_cards" => Ok(Self::GenerateGiftCards),
            other => Err(Error::Validation {
                message: format!("Unknown job type: {other}"),
                fields: vec!["job_type".to_string()],
            }),
        }
    }
}

const STATUS_PENDING: &str = "pending";
const STATUS_RUNNING: &str = "running";
const STATUS_COMPLETED: &str = "completed";
const STATUS_FAILED: &str = "failed";

/// Enqueues a job for a request.
///
/// A pending job of the same type for the same request is returned as-is
/// rather than duplicated, so repeated submissions collapse into one run.
pub async fn enqueue_job(
    db: &DatabaseConnection,
    request_id: i64,
    job_type: JobType,
) -> Result<background_job::Model> {
    if let Some(existing) = BackgroundJob::find()
        .filter(background_job::Column::GiftCardRequestId.eq(request_id))
        .filter(background_job::Column::JobType.eq(job_type.as_str()))
        .filter(background_job::Column::Status.eq(STATUS_PENDING))
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    let now = Utc::now();
    let job = background_job::ActiveModel {
        gift_card_request_id: Set(request_id),
        job_type: Set(job_type.as_str().to_string()),
        status: Set(STATUS_PENDING.to_string()),
        error: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let created = job.insert(db).await?;
    info!(job_id = created.id, request_id, job_type = job_type.as_str(), "enqueued job");
    Ok(created)
}

/// Claims the oldest pending job, moving it to `running`.
///
/// The claim is a conditional update, so two workers polling the same table
/// cannot both win the same job.
pub async fn claim_next_job(db: &DatabaseConnection) -> Result<Option<background_job::Model>> {
    let Some(job) = BackgroundJob::find()
        .filter(background_job::Column::Status.eq(STATUS_PENDING))
        .order_by_asc(background_job::Column::Id)
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    let claimed = BackgroundJob::update_many()
        .set(background_job::ActiveModel {
            status: Set(STATUS_RUNNING.to_string()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(background_job::Column::Id.eq(job.id))
        .filter(background_job::Column::Status.eq(STATUS_PENDING))
        .exec(db)
        .await?;
    if claimed.rows_affected == 0 {
        return Ok(None);
    }

    Ok(BackgroundJob::find_by_id(job.id).one(db).await?)
}

/// Runs the work a job describes.
async fn execute_job(
    db: &DatabaseConnection,
    slides: &dyn SlideTemplateApi,
    storage: &dyn ArtifactStorage,
    template_presentation_id: Option<&str>,
    job: &background_job::Model,
) -> Result<()> {
    match JobType::parse(&job.job_type)? {
        JobType::GenerateGiftCards => {
            let template = template_presentation_id.ok_or(Error::Config {
                message: "GIFT_CARD_PRESENTATION_ID is not configured".to_string(),
            })?;
            artifact::generate_gift_cards(db, slides, storage, template, job.gift_card_request_id)
                .await
        }
    }
}

/// Claims and runs at most one job, persisting its outcome.
///
/// Returns whether a job was processed; a failing job is recorded as
/// `failed` with its error message and does not bubble up, so the worker
/// loop keeps going.
pub async fn run_worker_once(
    db: &DatabaseConnection,
    slides: &dyn SlideTemplateApi,
    storage: &dyn ArtifactStorage,
    template_presentation_id: Option<&str>,
) -> Result<bool> {
    let Some(job) = claim_next_job(db).await? else {
        return Ok(false);
    };

    let job_id = job.id;
    let outcome = execute_job(db, slides, storage, template_presentation_id, &job).await;

    let mut active: background_job::ActiveModel = job.into();
    match outcome {
        Ok(()) => {
            active.status = Set(STATUS_COMPLETED.to_string());
            active.error = Set(None);
            info!(job_id, "job completed");
        }
        Err(err) => {
            warn!(job_id, error = %err, "job failed");
            active.status = Set(STATUS_FAILED.to_string());
            active.error = Set(Some(err.to_string()));
        }
    }
    active.updated_at = Set(Utc::now());
    active.update(db).await?;

    Ok(true)
}

/// Polls for jobs forever, sleeping `poll_interval` whenever the queue is
/// empty or the database is unreachable.
pub async fn run_worker(
    db: &DatabaseConnection,
    slides: &dyn SlideTemplateApi,
    storage: &dyn ArtifactStorage,
    template_presentation_id: Option<&str>,
    poll_interval: Duration,
) -> Result<()> {
    loop {
        match run_worker_once(db, slides, storage, template_presentation_id).await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(poll_interval).await,
            Err(err) => {
                error!(error = %err, "worker poll failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::assignment::auto_assign_trees;
    use crate::core::reconcile::{RecipientTarget, reconcile_card_slots};
    use crate::core::request::get_request;
    use crate::entities::GiftCard;
    use crate::test_utils::{
        FakeSlides, FakeStorage, create_booked_slot, create_plant_type_template,
        create_test_request, create_test_tree, setup_test_db,
    };

    #[tokio::test]
    async fn test_enqueue_collapses_pending_duplicates() -> Result<()> {
        let db = setup_test_db().await?;
        let request = create_test_request(&db, 1).await?;

        let first = enqueue_job(&db, request.id, JobType::GenerateGiftCards).await?;
        let second = enqueue_job(&db, request.id, JobType::GenerateGiftCards).await?;
        assert_eq!(first.id, second.id);
        assert_eq!(first.status, "pending");

        Ok(())
    }

    #[tokio::test]
    async fn test_claim_moves_job_to_running() -> Result<()> {
        let db = setup_test_db().await?;
        let request = create_test_request(&db, 1).await?;
        enqueue_job(&db, request.id, JobType::GenerateGiftCards).await?;

        let claimed = claim_next_job(&db).await?.unwrap();
        assert_eq!(claimed.status, "running");

        assert!(claim_next_job(&db).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_worker_runs_artifact_job_to_completion() -> Result<()> {
        let db = setup_test_db().await?;
        let request = create_test_request(&db, 1).await?;
        let tree = create_test_tree(&db, "SAP-1", "Neem", 1).await?;
        create_booked_slot(&db, request.id, Some(tree.id)).await?;
        create_plant_type_template(&db, "Neem", "tpl-neem").await?;
        reconcile_card_slots(
            &db,
            request.id,
            &[RecipientTarget {
                recipient: 1,
                assignee: 1,
                count: 1,
                profile_image_url: None,
                relation: None,
            }],
        )
        .await?;
        let request = get_request(&db, request.id).await?;
        auto_assign_trees(&db, &request, None).await?;

        enqueue_job(&db, request.id, JobType::GenerateGiftCards).await?;

        let slides = FakeSlides::default();
        let storage = FakeStorage::default();
        let processed = run_worker_once(&db, &slides, &storage, Some("master-template")).await?;
        assert!(processed);

        let job = BackgroundJob::find().one(&db).await?.unwrap();
        assert_eq!(job.status, "completed");
        assert!(job.error.is_none());

        let slot = GiftCard::find().one(&db).await?.unwrap();
        assert!(slot.card_image_url.is_some());

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_template_config_fails_job_without_crashing() -> Result<()> {
        let db = setup_test_db().await?;
        let request = create_test_request(&db, 1).await?;
        enqueue_job(&db, request.id, JobType::GenerateGiftCards).await?;

        let slides = FakeSlides::default();
        let storage = FakeStorage::default();
        let processed = run_worker_once(&db, &slides, &storage, None).await?;
        assert!(processed);

        let job = BackgroundJob::find().one(&db).await?.unwrap();
        assert_eq!(job.status, "failed");
        assert!(job.error.as_deref().unwrap().contains("GIFT_CARD_PRESENTATION_ID"));

        Ok(())
    }

    #[tokio::test]
    async fn test_worker_idles_without_jobs() -> Result<()> {
        let db = setup_test_db().await?;
        let slides = FakeSlides::default();
        let storage = FakeStorage::default();
        assert!(!run_worker_once(&db, &slides, &storage, None).await?);
        Ok(())
    }
}
