use chrono::Utc;

use ajo_core::DomainError;
use ajo_infra::read_model::Reservation;
use ajo_transactions::{
    MarkCompleted, MarkFailed, RecordTransaction, Transaction, TransactionCommand, TransactionId,
    TransactionStats, TransactionStatus, TransactionType, TransactionView,
};

use super::AppServices;
use super::contributions::ContributionRequest;
use crate::context::Caller;
use crate::error::ServiceResult;

impl AppServices {
    /// The caller's transactions, newest first.
    pub fn transactions_for(&self, caller: &Caller) -> Vec<TransactionView> {
        self.history
            .for_user(caller.user_id())
            .iter()
            .map(TransactionView::from)
            .collect()
    }

    /// One of the caller's transactions. Someone else's transaction is reported as missing.
    pub fn transaction(&self, caller: &Caller, transaction_id: &str) -> ServiceResult<TransactionView> {
        let id: TransactionId = transaction_id.parse()?;
        let transaction = self.owned_transaction(caller, id)?;
        Ok(TransactionView::from(&transaction))
    }

    /// Completed totals per transaction type.
    pub fn transaction_stats(&self, caller: &Caller) -> TransactionStats {
        self.history.stats_for(caller.user_id())
    }

    /// Retry a failed contribution or withdrawal as a new transaction that supersedes it.
    ///
    /// The failed record is claimed before anything moves, so concurrent retries of the
    /// same record resolve to one attempt; the others get `Conflict`. The claim is given
    /// back only when the attempt ends failed or unrecorded.
    pub fn retry_transaction(&self, caller: &Caller, transaction_id: &str) -> ServiceResult<TransactionView> {
        let id: TransactionId = transaction_id.parse()?;
        let failed = self.owned_transaction(caller, id)?;
        failed.ensure_supersedable_by(caller.user_id(), failed.group_id(), failed.kind())?;

        let successor = TransactionId::generate();
        if let Reservation::Taken(existing) = self.retries.reserve(id, successor) {
            return Err(DomainError::conflict(format!("transaction {id} has already been retried as {existing}")).into());
        }

        let outcome = match failed.kind() {
            TransactionType::Contribution => match failed.group_id() {
                Some(group_id) => {
                    let request = ContributionRequest {
                        amount: failed.amount(),
                        reference: failed.reference().map(str::to_string),
                        payment_method: failed.payment_method(),
                        payment_details: failed.payment_details().clone(),
                        description: failed.description().map(str::to_string),
                    };
                    self.contribute_as(successor, caller, group_id, request, Some(id))
                }
                None => Err(DomainError::invariant("contribution without a group").into()),
            },
            TransactionType::Withdrawal => self.withdraw_as(successor, caller, failed.amount(), Some(id)),
            TransactionType::Payout => Err(DomainError::validation(
                "payouts are settled by the group admin and cannot be retried by the recipient",
            )
            .into()),
        };

        if outcome.is_err() {
            let abandoned = self
                .history
                .get(successor)
                .is_none_or(|t| t.status() == TransactionStatus::Failed);
            if abandoned {
                self.retries.release(&id, &successor);
            }
        }
        outcome
    }

    fn owned_transaction(&self, caller: &Caller, id: TransactionId) -> ServiceResult<Transaction> {
        self.history
            .get(id)
            .filter(|t| t.user_id() == Some(caller.user_id()))
            .ok_or_else(|| DomainError::not_found(format!("transaction {id}")).into())
    }

    // -------------------------
    // Ledger steps shared by the money flows
    // -------------------------

    pub(super) fn record_transaction(&self, command: RecordTransaction) -> ServiceResult<Transaction> {
        let id = command.transaction_id;
        let dispatched = self.execute(
            id.aggregate_id(),
            ajo_transactions::AGGREGATE_TYPE,
            &TransactionCommand::Record(command),
            Transaction::empty,
        )?;
        Ok(dispatched.state)
    }

    pub(super) fn complete_transaction(
        &self,
        id: TransactionId,
        processor_reference: Option<String>,
    ) -> ServiceResult<Transaction> {
        let command = TransactionCommand::MarkCompleted(MarkCompleted {
            processor_reference,
            occurred_at: Utc::now(),
        });
        let dispatched = self.execute(id.aggregate_id(), ajo_transactions::AGGREGATE_TYPE, &command, Transaction::empty)?;
        Ok(dispatched.state)
    }

    pub(super) fn fail_transaction(&self, id: TransactionId, reason: &str) -> ServiceResult<()> {
        let command = TransactionCommand::MarkFailed(MarkFailed {
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        self.execute(id.aggregate_id(), ajo_transactions::AGGREGATE_TYPE, &command, Transaction::empty)?;
        Ok(())
    }
}
