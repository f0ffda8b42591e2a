//! Donor group membership collaborator.

use crate::errors::Result;
use async_trait::async_trait;

/// Manages membership of the shared "donors" user group.
#[async_trait]
pub trait DonorGroups: Send + Sync {
    /// Adds the user to the donor group. Idempotent: adding an existing
    /// member is a no-op.
    async fn add_user_to_donor_group(&self, user_id: i64) -> Result<()>;
}
