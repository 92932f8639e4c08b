//! Payout rotation operations exposed by the engine.

use super::Engine;
use crate::{
    core::rotation::{self, NextPayout},
    entities::payout,
    errors::Result,
};

impl Engine {
    /// Who receives the pot next, and whether the period is fully collected.
    pub async fn get_next_payout(&self, group_id: i64) -> Result<NextPayout> {
        rotation::next_payout(&self.database, group_id, self.now()).await
    }

    /// Marks the current recipient paid out and advances the rotation.
    pub async fn record_payout(&self, group_id: i64) -> Result<payout::Model> {
        let _guard = self.locks.acquire(group_id).await;
        rotation::record_payout(&self.database, group_id, self.now()).await
    }

    /// Records payouts for every consecutive collected period.
    pub async fn advance_rotation(&self, group_id: i64) -> Result<Vec<payout::Model>> {
        let _guard = self.locks.acquire(group_id).await;
        rotation::advance_rotation(&self.database, group_id, self.now()).await
    }

    /// Every payout the group has made, oldest first.
    pub async fn payout_history(&self, group_id: i64) -> Result<Vec<payout::Model>> {
        rotation::list_payouts(&self.database, group_id).await
    }
}
