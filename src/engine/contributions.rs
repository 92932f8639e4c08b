//! Contribution listing and payment submission.

use super::Engine;
use crate::{
    core::{
        group, ledger,
        payment::{self, PaymentOutcome, PaymentRequest},
        report::{self, ContributionsView},
    },
    errors::{Error, Result},
};
use tracing::instrument;

impl Engine {
    /// Obligations of the group's current cycle with their derived status and stats.
    pub async fn get_contributions(&self, group_id: i64) -> Result<ContributionsView> {
        let group = group::require_group(&self.database, group_id).await?;
        report::contributions_view(&self.database, &group, self.now()).await
    }

    /// Submits a payment against an obligation, timestamped with the engine clock.
    ///
    /// Resubmitting the same `idempotency_key` for the same obligation returns
    /// [`PaymentOutcome::Duplicate`] and writes nothing.
    #[instrument(skip(self, method))]
    pub async fn submit_payment(
        &self,
        obligation_id: i64,
        amount: i64,
        method: &str,
        idempotency_key: &str,
    ) -> Result<PaymentOutcome> {
        let obligation = ledger::get_obligation_by_id(&self.database, obligation_id)
            .await?
            .ok_or(Error::UnknownObligation { obligation_id })?;

        let _guard = self.locks.acquire(obligation.group_id).await;
        let request = PaymentRequest {
            obligation_id,
            amount,
            method: method.to_string(),
            idempotency_key: idempotency_key.to_string(),
            paid_at: self.now(),
        };
        payment::apply_payment(&self.database, &self.settings, &request).await
    }
}
