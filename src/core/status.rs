//! Request fulfillment status machine.
//!
//! Status is derived from the booked/assigned/rendered counts rather than
//! transitioned explicitly, and only ever moves forward; the single backward
//! move is the administrative unbook action in
//! [`crate::core::allocation::unbook_trees`].

use crate::entities::{GiftCard, gift_card, gift_card_request};
use crate::errors::{Error, Result};
use sea_orm::prelude::*;

/// Lifecycle status of a gift card request.
///
/// Ordering matters: later variants compare greater, which is what keeps the
/// derivation forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestStatus {
    /// Plots still need to be assigned for sourcing trees
    PendingPlotSelection,
    /// Trees are booked; recipients still need trees assigned
    PendingAssignment,
    /// All trees assigned; card artifacts not yet rendered
    PendingGiftCards,
    /// Every card has a rendered artifact
    Completed,
}

impl RequestStatus {
    /// Stored string form of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingPlotSelection => "pending_plot_selection",
            Self::PendingAssignment => "pending_assignment",
            Self::PendingGiftCards => "pending_gift_cards",
            Self::Completed => "completed",
        }
    }

    /// Parses the stored string form.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "pending_plot_selection" => Ok(Self::PendingPlotSelection),
            "pending_assignment" => Ok(Self::PendingAssignment),
            "pending_gift_cards" => Ok(Self::PendingGiftCards),
            "completed" => Ok(Self::Completed),
            other => Err(Error::Validation {
                message: format!("Unknown request status: {other}"),
                fields: vec!["status".to_string()],
            }),
        }
    }
}

/// Derived fulfillment counts for a request.
///
/// Invariants: `booked <= purchased` and `assigned <= booked` hold at every
/// point in the lifecycle because trees are only reserved up to the deficit
/// and recipients are only linked onto tree-bound slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestCounts {
    /// Cards purchased by the sponsor
    pub purchased: u64,
    /// Slots with a tree bound
    pub booked: u64,
    /// Slots with a tree and a recipient/assignee pair
    pub assigned: u64,
    /// Slots with a rendered artifact
    pub rendered: u64,
}

impl RequestCounts {
    /// Loads the counts for a request from its gift cards.
    pub async fn load(
        db: &DatabaseConnection,
        request: &gift_card_request::Model,
    ) -> Result<Self> {
        let cards = GiftCard::find()
            .filter(gift_card::Column::GiftCardRequestId.eq(request.id))
            .all(db)
            .await?;

        let booked = cards.iter().filter(|c| c.tree_id.is_some()).count() as u64;
        let assigned = cards
            .iter()
            .filter(|c| c.tree_id.is_some() && c.gifted_to.is_some() && c.assigned_to.is_some())
            .count() as u64;
        let rendered = cards.iter().filter(|c| c.card_image_url.is_some()).count() as u64;

        Ok(Self {
            purchased: request.no_of_cards as u64,
            booked,
            assigned,
            rendered,
        })
    }
}

/// Derives the status a request should be in given its counts.
///
/// The result never moves backward from `current`; freeing trees or
/// recipients does not demote a request, only `unbook_trees` does.
pub fn derive_status(current: RequestStatus, counts: &RequestCounts) -> RequestStatus {
    let candidate = if counts.purchased > 0
        && counts.assigned == counts.purchased
        && counts.rendered >= counts.purchased
    {
        RequestStatus::Completed
    } else if counts.purchased > 0 && counts.assigned == counts.purchased {
        RequestStatus::PendingGiftCards
    } else if counts.purchased > 0 && counts.booked == counts.purchased {
        RequestStatus::PendingAssignment
    } else {
        RequestStatus::PendingPlotSelection
    };

    current.max(candidate)
}

/// Reloads a request, re-derives its status from the current counts, and
/// persists the result if it moved.
pub async fn refresh_request_status(
    db: &DatabaseConnection,
    request_id: i64,
) -> Result<RequestStatus> {
    let request = crate::entities::GiftCardRequest::find_by_id(request_id)
        .one(db)
        .await?
        .ok_or(Error::RequestNotFound { id: request_id })?;

    let counts = RequestCounts::load(db, &request).await?;
    let current = RequestStatus::parse(&request.status)?;
    let next = derive_status(current, &counts);

    if next != current {
        let mut active: gift_card_request::ActiveModel = request.into();
        active.status = sea_orm::Set(next.as_str().to_string());
        active.updated_at = sea_orm::Set(chrono::Utc::now());
        active.update(db).await?;
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn counts(purchased: u64, booked: u64, assigned: u64, rendered: u64) -> RequestCounts {
        RequestCounts {
            purchased,
            booked,
            assigned,
            rendered,
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            RequestStatus::PendingPlotSelection,
            RequestStatus::PendingAssignment,
            RequestStatus::PendingGiftCards,
            RequestStatus::Completed,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(RequestStatus::parse("bogus").is_err());
    }

    #[test]
    fn test_fully_booked_moves_to_pending_assignment() {
        let status = derive_status(RequestStatus::PendingPlotSelection, &counts(5, 5, 0, 0));
        assert_eq!(status, RequestStatus::PendingAssignment);
    }

    #[test]
    fn test_partial_booking_stays_put() {
        let status = derive_status(RequestStatus::PendingPlotSelection, &counts(5, 3, 0, 0));
        assert_eq!(status, RequestStatus::PendingPlotSelection);
    }

    #[test]
    fn test_fully_assigned_moves_to_pending_gift_cards() {
        let status = derive_status(RequestStatus::PendingAssignment, &counts(5, 5, 5, 0));
        assert_eq!(status, RequestStatus::PendingGiftCards);
    }

    #[test]
    fn test_all_rendered_completes() {
        let status = derive_status(RequestStatus::PendingGiftCards, &counts(5, 5, 5, 5));
        assert_eq!(status, RequestStatus::Completed);
    }

    #[test]
    fn test_never_moves_backward() {
        // Counts that would suggest pending_plot_selection must not demote
        let status = derive_status(RequestStatus::PendingGiftCards, &counts(5, 3, 1, 0));
        assert_eq!(status, RequestStatus::PendingGiftCards);
    }

    #[test]
    fn test_zero_purchase_never_completes() {
        let status = derive_status(RequestStatus::PendingPlotSelection, &counts(0, 0, 0, 0));
        assert_eq!(status, RequestStatus::PendingPlotSelection);
    }
}
