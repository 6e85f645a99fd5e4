use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use ajo_core::{Aggregate, AggregateId, DomainError};
use ajo_groups::{Group, GroupCommand, GroupEvent, GroupSummary, ProcessPayout, RecordContribution};
use ajo_infra::read_model::Reservation;
use ajo_transactions::{
    PaymentDetails, PaymentMethod, RecordTransaction, TransactionId, TransactionStatus, TransactionType,
    TransactionView,
};
use ajo_wallet::{SettleLocked, SettlementPurpose, Wallet, WalletCommand};

use super::AppServices;
use super::wallets::move_funds;
use crate::context::Caller;
use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionRequest {
    pub amount: u64,
    /// External payment reference; a repeated reference returns the original transaction.
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_details: PaymentDetails,
    #[serde(default)]
    pub description: Option<String>,
}

impl ContributionRequest {
    pub fn new(amount: u64) -> Self {
        Self {
            amount,
            reference: None,
            payment_method: PaymentMethod::default(),
            payment_details: PaymentDetails::default(),
            description: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// A settled payout: the recipient's transaction and the group after the turn advanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutOutcome {
    pub transaction: TransactionView,
    pub group: GroupSummary,
}

impl AppServices {
    /// Pay this cycle's contribution from the caller's wallet into the group pool.
    ///
    /// Steps: record a pending transaction, lock wallet funds, credit the pool, settle the
    /// lock, complete the transaction. A failure before settlement unlocks the funds and
    /// marks the transaction failed.
    pub fn contribute(
        &self,
        caller: &Caller,
        group_id: AggregateId,
        request: ContributionRequest,
    ) -> ServiceResult<TransactionView> {
        self.contribute_as(TransactionId::generate(), caller, group_id, request, None)
    }

    pub(super) fn contribute_as(
        &self,
        transaction_id: TransactionId,
        caller: &Caller,
        group_id: AggregateId,
        request: ContributionRequest,
        supersedes: Option<TransactionId>,
    ) -> ServiceResult<TransactionView> {
        let user_id = caller.user_id();
        let group_command = GroupCommand::RecordContribution(RecordContribution {
            user_id,
            amount: request.amount,
            occurred_at: Utc::now(),
        });

        let reference = request
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        if let Some(reference) = &reference {
            if let Reservation::Taken(existing) = self.payment_references.reserve(reference.clone(), transaction_id) {
                return self.replayed_contribution(caller, group_id, request.amount, existing);
            }
        }
        let release_reference = || {
            if let Some(reference) = &reference {
                self.payment_references.release(reference, &transaction_id);
            }
        };

        // Reject what the group would reject before touching the wallet.
        let precheck = self
            .load(group_id, Group::empty)
            .and_then(|group| group.handle(&group_command).map_err(ServiceError::from));
        if let Err(err) = precheck {
            release_reference();
            return Err(err);
        }

        let recorded = self.record_transaction(RecordTransaction {
            transaction_id,
            user_id,
            group_id: Some(group_id),
            kind: TransactionType::Contribution,
            amount: request.amount,
            payment_method: request.payment_method,
            payment_details: request.payment_details,
            metadata: serde_json::json!({ "groupId": group_id.to_string() }),
            description: request.description,
            reference: reference.clone(),
            supersedes,
            occurred_at: Utc::now(),
        });
        if let Err(err) = recorded {
            release_reference();
            return Err(err);
        }

        if let Err(err) = self.wallet_command(user_id, WalletCommand::LockFunds(move_funds(user_id, request.amount))) {
            self.compensate("contribute.fail_transaction", self.fail_transaction(transaction_id, &err.to_string()));
            release_reference();
            return Err(err);
        }

        if let Err(err) = self.group_command(group_id, &group_command) {
            self.compensate(
                "contribute.unlock",
                self.wallet_command(user_id, WalletCommand::UnlockFunds(move_funds(user_id, request.amount)))
                    .map(|_| ()),
            );
            self.compensate("contribute.fail_transaction", self.fail_transaction(transaction_id, &err.to_string()));
            release_reference();
            return Err(err);
        }

        let settle = WalletCommand::SettleLocked(SettleLocked {
            user_id,
            amount: request.amount,
            purpose: SettlementPurpose::Contribution,
            occurred_at: Utc::now(),
        });
        if let Err(err) = self.wallet_command(user_id, settle) {
            // The pool already holds the money; leave the transaction pending for reconciliation.
            error!(
                user_id = %user_id,
                group_id = %group_id,
                transaction_id = %transaction_id,
                error = %err,
                "contribution credited but not settled"
            );
            return Err(ServiceError::Internal);
        }

        let completed = self.complete_transaction(transaction_id, reference)?;
        info!(
            user_id = %user_id,
            group_id = %group_id,
            transaction_id = %transaction_id,
            amount = request.amount,
            "contribution settled"
        );
        Ok(TransactionView::from(&completed))
    }

    /// Admin pays the pool to the member holding the current turn.
    pub fn process_payout(&self, caller: &Caller, group_id: AggregateId) -> ServiceResult<PayoutOutcome> {
        let command = GroupCommand::ProcessPayout(ProcessPayout {
            caller: caller.user_id(),
            occurred_at: Utc::now(),
        });

        // Dry run: find the recipient and make sure their wallet can be credited.
        let decided = self.load(group_id, Group::empty)?.handle(&command)?;
        if let Some(payout) = decided.iter().find_map(payout_of) {
            let wallet = self.load(AggregateId::from(payout.recipient), Wallet::empty)?;
            if wallet.is_disabled() {
                return Err(DomainError::invalid_transition("recipient wallet is disabled").into());
            }
        }

        let dispatched = self.execute(group_id, ajo_groups::AGGREGATE_TYPE, &command, Group::empty)?;
        let payout = dispatched
            .events
            .iter()
            .find_map(payout_of)
            .ok_or_else(|| ServiceError::internal("process_payout", "payout committed without a PayoutProcessed event"))?;
        let recipient = payout.recipient;
        let amount = payout.amount.get();

        let transaction_id = TransactionId::generate();
        let recorded = self.record_transaction(RecordTransaction {
            transaction_id,
            user_id: recipient,
            group_id: Some(group_id),
            kind: TransactionType::Payout,
            amount,
            payment_method: PaymentMethod::Wallet,
            payment_details: PaymentDetails::default(),
            metadata: serde_json::json!({ "turnNumber": payout.turn }),
            description: Some(format!("Payout for turn {}", payout.turn + 1)),
            reference: None,
            supersedes: None,
            occurred_at: Utc::now(),
        });
        if let Err(err) = recorded {
            error!(group_id = %group_id, recipient = %recipient, amount, error = %err, "payout processed but not recorded");
            return Err(ServiceError::Internal);
        }

        if let Err(err) = self.wallet_command(recipient, WalletCommand::RecordPayout(move_funds(recipient, amount))) {
            error!(group_id = %group_id, recipient = %recipient, amount, error = %err, "payout processed but not credited");
            self.compensate("payout.fail_transaction", self.fail_transaction(transaction_id, &err.to_string()));
            return Err(ServiceError::Internal);
        }

        let completed = self.complete_transaction(transaction_id, None)?;
        info!(
            group_id = %group_id,
            recipient = %recipient,
            amount,
            turn = payout.turn,
            status = %dispatched.state.status(),
            "payout settled"
        );
        Ok(PayoutOutcome {
            transaction: TransactionView::from(&completed),
            group: GroupSummary::from(&dispatched.state),
        })
    }

    /// A reused reference is only a replay when it names the same completed contribution:
    /// same user, group and amount.
    fn replayed_contribution(
        &self,
        caller: &Caller,
        group_id: AggregateId,
        amount: u64,
        existing: TransactionId,
    ) -> ServiceResult<TransactionView> {
        let original = self
            .history
            .get(existing)
            .ok_or_else(|| DomainError::conflict("a payment with this reference is in progress"))?;

        let same_request = original.user_id() == Some(caller.user_id())
            && original.group_id() == Some(group_id)
            && original.kind() == TransactionType::Contribution
            && original.amount() == amount;
        if !same_request {
            return Err(DomainError::conflict("payment reference already used").into());
        }

        match original.status() {
            TransactionStatus::Completed => {
                info!(transaction_id = %existing, "payment reference already used, returning original");
                Ok(TransactionView::from(&original))
            }
            _ => Err(DomainError::conflict("a payment with this reference is in progress").into()),
        }
    }
}

fn payout_of(event: &GroupEvent) -> Option<&ajo_groups::PayoutProcessed> {
    match event {
        GroupEvent::PayoutProcessed(e) => Some(e),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ajo_core::UserId;

    use super::*;
    use crate::collaborators::NoProcessor;
    use crate::config::AppConfig;

    #[test]
    fn reference_of_an_unsettled_contribution_is_not_replayed() {
        let services = AppServices::new(AppConfig::default(), Arc::new(NoProcessor), Arc::new(NoProcessor));
        let ada = Caller::new(UserId::new(), "Ada");
        let group_id = AggregateId::new();

        // A contribution still between its pending record and settlement.
        let in_flight = TransactionId::generate();
        services
            .record_transaction(RecordTransaction {
                transaction_id: in_flight,
                user_id: ada.user_id(),
                group_id: Some(group_id),
                kind: TransactionType::Contribution,
                amount: 1_000,
                payment_method: PaymentMethod::default(),
                payment_details: PaymentDetails::default(),
                metadata: serde_json::json!({}),
                description: None,
                reference: Some("PAY-7".to_string()),
                supersedes: None,
                occurred_at: Utc::now(),
            })
            .unwrap();
        services.payment_references.reserve("PAY-7".to_string(), in_flight);

        let err = services
            .contribute(&ada, group_id, ContributionRequest::new(1_000).with_reference("PAY-7"))
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert_eq!(services.transactions_for(&ada).len(), 1);
        assert_eq!(services.payment_references.lookup(&"PAY-7".to_string()), Some(in_flight));
    }
}
