//! Tree inventory collaborator.
//!
//! Tree selection (plot membership, habit filters, diversification) is a
//! heavy query owned by the inventory service; the engine only hands over the
//! constraints and receives tree ids, possibly fewer than requested.

use crate::entities::tree;
use crate::errors::Result;
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, QueryOrder, prelude::*};

/// Constraints for a reservation query.
#[derive(Debug, Clone)]
pub struct ReserveTreesQuery {
    /// Sponsoring user the trees get mapped to
    pub sponsor_id: i64,
    /// Optional sponsoring group
    pub group_id: Option<i64>,
    /// Plots the trees may come from
    pub plot_ids: Vec<i64>,
    /// Number of trees wanted
    pub count: u64,
    /// Whether non-giftable trees may be reserved
    pub include_non_giftable: bool,
    /// Whether to spread the selection across species and plots
    pub diversify: bool,
    /// Whether all habits (shrubs, climbers, ...) are acceptable
    pub include_all_habits: bool,
}

/// Reserves trees out of the shared inventory.
#[async_trait]
pub trait TreeInventory: Send + Sync {
    /// Reserves up to `query.count` trees and returns their ids.
    ///
    /// May return fewer than requested when stock runs short; the caller
    /// treats the shortfall as partial fulfilment, not an error.
    async fn reserve_trees(&self, query: ReserveTreesQuery) -> Result<Vec<i64>>;
}

/// Inventory backed by the engine's own `trees` table.
///
/// Selects unmapped, unassigned trees from the requested plots. Giftability
/// and habit filters live in the richer upstream inventory service; this
/// implementation filters on availability only.
#[derive(Debug, Clone)]
pub struct PlotTreeInventory {
    db: DatabaseConnection,
}

impl PlotTreeInventory {
    /// Creates an inventory over the given database.
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TreeInventory for PlotTreeInventory {
    async fn reserve_trees(&self, query: ReserveTreesQuery) -> Result<Vec<i64>> {
        let available = tree::Entity::find()
            .filter(tree::Column::PlotId.is_in(query.plot_ids.clone()))
            .filter(tree::Column::MappedToUser.is_null())
            .filter(tree::Column::AssignedTo.is_null())
            .order_by_asc(tree::Column::Id)
            .all(&self.db)
            .await?;

        let picked = if query.diversify {
            interleave_by_species(available)
        } else {
            available
        };

        Ok(picked
            .into_iter()
            .take(query.count as usize)
            .map(|t| t.id)
            .collect())
    }
}

/// Round-robins trees across species, species ordered by first appearance,
/// so a diversified pick never drains one species first.
fn interleave_by_species(trees: Vec<tree::Model>) -> Vec<tree::Model> {
    let mut groups: Vec<(String, std::collections::VecDeque<tree::Model>)> = Vec::new();
    for found in trees {
        match groups.iter_mut().find(|(species, _)| *species == found.plant_type) {
            Some((_, group)) => group.push_back(found),
            None => groups.push((found.plant_type.clone(), [found].into())),
        }
    }

    let mut picked = Vec::new();
    while groups.iter().any(|(_, g)| !g.is_empty()) {
        for (_, group) in &mut groups {
            if let Some(found) = group.pop_front() {
                picked.push(found);
            }
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{create_test_tree, setup_test_db};

    fn query(plot_ids: Vec<i64>, count: u64, diversify: bool) -> ReserveTreesQuery {
        ReserveTreesQuery {
            sponsor_id: 1,
            group_id: None,
            plot_ids,
            count,
            include_non_giftable: false,
            diversify,
            include_all_habits: false,
        }
    }

    #[tokio::test]
    async fn test_only_available_trees_from_requested_plots() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let in_plot = create_test_tree(&db, "SAP-1", "Neem", 1).await?;
        create_test_tree(&db, "SAP-2", "Neem", 2).await?;

        let mapped = create_test_tree(&db, "SAP-3", "Neem", 1).await?;
        let mut active: tree::ActiveModel = mapped.into();
        active.mapped_to_user = sea_orm::Set(Some(7));
        active.update(&db).await?;

        let inventory = PlotTreeInventory::new(db);
        let ids = inventory.reserve_trees(query(vec![1], 10, false)).await?;
        assert_eq!(ids, vec![in_plot.id]);

        Ok(())
    }

    #[tokio::test]
    async fn test_diversified_pick_round_robins_species() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        for i in 0..3 {
            create_test_tree(&db, &format!("N-{i}"), "Neem", 1).await?;
        }
        for i in 0..3 {
            create_test_tree(&db, &format!("M-{i}"), "Mango", 1).await?;
        }

        let inventory = PlotTreeInventory::new(db.clone());
        let ids = inventory.reserve_trees(query(vec![1], 4, true)).await?;

        let mut species = Vec::new();
        for id in ids {
            let found = tree::Entity::find_by_id(id).one(&db).await?.unwrap();
            species.push(found.plant_type);
        }
        assert_eq!(species, ["Neem", "Mango", "Neem", "Mango"]);

        Ok(())
    }
}
