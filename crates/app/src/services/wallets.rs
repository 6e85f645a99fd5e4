use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};

use ajo_core::{AggregateId, Amount, DomainError, UserId};
use ajo_transactions::{
    PaymentDetails, PaymentMethod, RecordTransaction, TransactionId, TransactionType, TransactionView,
};
use ajo_wallet::{
    AddBankAccount, BankAccountId, BankAccountView, DisableWallet, MoveFunds, NewBankAccount, OpenWallet,
    SetPrimaryAccount, SettleLocked, SettlementPurpose, Wallet, WalletCommand, WalletView,
};

use super::AppServices;
use crate::collaborators::ResolvedAccount;
use crate::context::Caller;
use crate::error::{ServiceError, ServiceResult};

const WITHDRAWAL_REASON: &str = "Ajo wallet withdrawal";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBankAccountRequest {
    pub account_number: String,
    pub bank_code: String,
    pub bank_name: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl AppServices {
    /// The caller's wallet, opened on first access.
    pub fn wallet(&self, caller: &Caller) -> ServiceResult<WalletView> {
        let user_id = caller.user_id();
        let wallet = self.wallet_command(
            user_id,
            WalletCommand::Open(OpenWallet {
                user_id,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(WalletView::from(&wallet))
    }

    /// Credit funds that arrived from outside the ledger (card top-up).
    pub fn deposit(&self, caller: &Caller, amount: u64) -> ServiceResult<WalletView> {
        let user_id = caller.user_id();
        let wallet = self.wallet_command(user_id, WalletCommand::AddFunds(move_funds(user_id, amount)))?;
        info!(user_id = %user_id, amount, "wallet funded");
        Ok(WalletView::from(&wallet))
    }

    pub fn verify_bank_account(&self, account_number: &str, bank_code: &str) -> ServiceResult<ResolvedAccount> {
        if account_number.trim().is_empty() || bank_code.trim().is_empty() {
            return Err(DomainError::validation("account number and bank code are required").into());
        }
        Ok(self.verifier.resolve_account(account_number.trim(), bank_code.trim())?)
    }

    /// Resolve the account holder, register a transfer recipient and link the account.
    pub fn add_bank_account(&self, caller: &Caller, request: AddBankAccountRequest) -> ServiceResult<BankAccountView> {
        let user_id = caller.user_id();
        let account_number = request.account_number.trim();
        let bank_code = request.bank_code.trim();

        let current = self.load(AggregateId::from(user_id), Wallet::empty)?;
        if current.bank_accounts().iter().any(|a| a.matches(account_number, bank_code)) {
            return Err(DomainError::DuplicateAccount.into());
        }

        let resolved = self.verify_bank_account(account_number, bank_code)?;
        let recipient = self.verifier.create_recipient(
            &resolved.account_number,
            &resolved.account_name,
            bank_code,
            &self.config.currency,
        )?;

        let account_id = BankAccountId::new();
        let wallet = self.wallet_command(
            user_id,
            WalletCommand::AddBankAccount(AddBankAccount {
                user_id,
                account_id,
                details: NewBankAccount {
                    account_number: resolved.account_number,
                    bank_code: bank_code.to_string(),
                    bank_name: request.bank_name,
                    account_name: resolved.account_name,
                    is_primary: request.is_primary,
                    is_verified: true,
                    recipient_reference: Some(recipient),
                },
                occurred_at: Utc::now(),
            }),
        )?;

        let linked = wallet
            .bank_accounts()
            .iter()
            .find(|a| a.account_id == account_id)
            .ok_or_else(|| ServiceError::internal("add_bank_account", "linked account missing after commit"))?;
        info!(user_id = %user_id, account_id = %account_id, primary = linked.is_primary, "bank account linked");
        Ok(BankAccountView::from(linked))
    }

    pub fn bank_accounts(&self, caller: &Caller) -> ServiceResult<Vec<BankAccountView>> {
        let wallet = self.load(AggregateId::from(caller.user_id()), Wallet::empty)?;
        Ok(wallet.bank_accounts().iter().map(BankAccountView::from).collect())
    }

    pub fn set_primary_account(&self, caller: &Caller, account_id: BankAccountId) -> ServiceResult<Vec<BankAccountView>> {
        let user_id = caller.user_id();
        let wallet = self.wallet_command(
            user_id,
            WalletCommand::SetPrimaryAccount(SetPrimaryAccount {
                user_id,
                account_id,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(wallet.bank_accounts().iter().map(BankAccountView::from).collect())
    }

    pub fn disable_wallet(&self, caller: &Caller, reason: Option<String>) -> ServiceResult<WalletView> {
        let user_id = caller.user_id();
        let wallet = self.wallet_command(
            user_id,
            WalletCommand::Disable(DisableWallet {
                user_id,
                reason,
                occurred_at: Utc::now(),
            }),
        )?;
        warn!(user_id = %user_id, "wallet disabled");
        Ok(WalletView::from(&wallet))
    }

    /// Pay out available funds to the primary bank account.
    ///
    /// Funds are locked before the transfer and settled after it; a refused transfer
    /// unlocks them and marks the transaction failed.
    pub fn withdraw(&self, caller: &Caller, amount: u64) -> ServiceResult<TransactionView> {
        self.withdraw_as(TransactionId::generate(), caller, amount, None)
    }

    pub(super) fn withdraw_as(
        &self,
        transaction_id: TransactionId,
        caller: &Caller,
        amount: u64,
        supersedes: Option<TransactionId>,
    ) -> ServiceResult<TransactionView> {
        let user_id = caller.user_id();
        let amount = Amount::new(amount)?;

        let wallet = self.load(AggregateId::from(user_id), Wallet::empty)?;
        if wallet.is_disabled() {
            return Err(DomainError::invalid_transition("wallet is disabled").into());
        }
        let account = wallet
            .primary_account()
            .ok_or_else(|| DomainError::validation("link a bank account before withdrawing"))?;
        let recipient = account
            .recipient_reference
            .clone()
            .ok_or_else(|| DomainError::validation("primary bank account cannot receive transfers"))?;

        self.record_transaction(RecordTransaction {
            transaction_id,
            user_id,
            group_id: None,
            kind: TransactionType::Withdrawal,
            amount: amount.get(),
            payment_method: PaymentMethod::BankTransfer,
            payment_details: PaymentDetails {
                bank_name: Some(account.bank_name.clone()),
                ..PaymentDetails::default()
            },
            metadata: serde_json::json!({ "accountId": account.account_id.to_string() }),
            description: Some(WITHDRAWAL_REASON.to_string()),
            reference: None,
            supersedes,
            occurred_at: Utc::now(),
        })?;

        if let Err(err) = self.wallet_command(user_id, WalletCommand::LockFunds(move_funds(user_id, amount.get()))) {
            self.compensate("withdraw.fail_transaction", self.fail_transaction(transaction_id, &err.to_string()));
            return Err(err);
        }

        let receipt = match self.gateway.transfer(&recipient, amount, WITHDRAWAL_REASON) {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(user_id = %user_id, transaction_id = %transaction_id, error = %err, "transfer refused");
                self.compensate(
                    "withdraw.unlock",
                    self.wallet_command(user_id, WalletCommand::UnlockFunds(move_funds(user_id, amount.get())))
                        .map(|_| ()),
                );
                self.compensate("withdraw.fail_transaction", self.fail_transaction(transaction_id, &err.to_string()));
                return Err(err.into());
            }
        };

        let settle = WalletCommand::SettleLocked(SettleLocked {
            user_id,
            amount: amount.get(),
            purpose: SettlementPurpose::Withdrawal,
            occurred_at: Utc::now(),
        });
        if let Err(err) = self.wallet_command(user_id, settle) {
            // The transfer went out; leave the transaction pending for reconciliation.
            error!(
                user_id = %user_id,
                transaction_id = %transaction_id,
                transfer_code = %receipt.transfer_code,
                error = %err,
                "withdrawal transferred but not settled"
            );
            return Err(ServiceError::Internal);
        }

        let completed = self.complete_transaction(transaction_id, Some(receipt.reference))?;
        info!(user_id = %user_id, transaction_id = %transaction_id, amount = amount.get(), "withdrawal completed");
        Ok(TransactionView::from(&completed))
    }

    pub(super) fn wallet_command(&self, user_id: UserId, command: WalletCommand) -> ServiceResult<Wallet> {
        let dispatched = self.execute(AggregateId::from(user_id), ajo_wallet::AGGREGATE_TYPE, &command, Wallet::empty)?;
        Ok(dispatched.state)
    }
}

pub(super) fn move_funds(user_id: UserId, amount: u64) -> MoveFunds {
    MoveFunds {
        user_id,
        amount,
        occurred_at: Utc::now(),
    }
}
