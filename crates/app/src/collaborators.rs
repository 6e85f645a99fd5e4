//! Seams to the payment processor.
//!
//! The ledgers never talk to a processor directly. Services call these traits at fixed
//! points in each flow, and every call after the first state change has a compensation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ajo_core::Amount;
use ajo_wallet::RecipientReference;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The processor answered and refused (unknown account, declined transfer).
    #[error("rejected by processor: {0}")]
    Rejected(String),

    /// The processor could not be reached or failed internally.
    #[error("processor unavailable: {0}")]
    Unavailable(String),
}

/// Account holder details as resolved by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAccount {
    pub account_name: String,
    pub account_number: String,
}

pub trait BankAccountVerifier: Send + Sync {
    fn resolve_account(&self, account_number: &str, bank_code: &str) -> Result<ResolvedAccount, CollaboratorError>;

    /// Register the account as a transfer recipient; the reference is what transfers target.
    fn create_recipient(
        &self,
        account_number: &str,
        account_name: &str,
        bank_code: &str,
        currency: &str,
    ) -> Result<RecipientReference, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub transfer_code: String,
    pub reference: String,
}

pub trait TransferGateway: Send + Sync {
    fn transfer(
        &self,
        recipient: &RecipientReference,
        amount: Amount,
        reason: &str,
    ) -> Result<TransferReceipt, CollaboratorError>;
}

/// Stand-in for processes that never move money (the sweeper). Every call is `Unavailable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProcessor;

impl BankAccountVerifier for NoProcessor {
    fn resolve_account(&self, _account_number: &str, _bank_code: &str) -> Result<ResolvedAccount, CollaboratorError> {
        Err(CollaboratorError::Unavailable("no payment processor configured".to_string()))
    }

    fn create_recipient(
        &self,
        _account_number: &str,
        _account_name: &str,
        _bank_code: &str,
        _currency: &str,
    ) -> Result<RecipientReference, CollaboratorError> {
        Err(CollaboratorError::Unavailable("no payment processor configured".to_string()))
    }
}

impl TransferGateway for NoProcessor {
    fn transfer(
        &self,
        _recipient: &RecipientReference,
        _amount: Amount,
        _reason: &str,
    ) -> Result<TransferReceipt, CollaboratorError> {
        Err(CollaboratorError::Unavailable("no payment processor configured".to_string()))
    }
}
