//! Outward-facing wallet representation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bank_account::{BankAccount, BankAccountId};
use crate::wallet::Wallet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountView {
    pub account_id: BankAccountId,
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    pub is_primary: bool,
    pub is_verified: bool,
    pub added_at: DateTime<Utc>,
}

impl From<&BankAccount> for BankAccountView {
    fn from(account: &BankAccount) -> Self {
        Self {
            account_id: account.account_id,
            account_number: account.account_number.clone(),
            account_name: account.account_name.clone(),
            bank_name: account.bank_name.clone(),
            is_primary: account.is_primary,
            is_verified: account.is_verified,
            added_at: account.added_at,
        }
    }
}

/// Wallet as returned to its owner. The processor recipient token is omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub user_id: Option<String>,
    pub total_balance: u64,
    pub available_balance: u64,
    pub locked_balance: u64,
    pub total_payouts: u64,
    pub total_contributions: u64,
    pub total_withdrawals: u64,
    pub linked_bank_accounts: Vec<BankAccountView>,
    pub disabled: bool,
}

impl From<&Wallet> for WalletView {
    fn from(wallet: &Wallet) -> Self {
        Self {
            user_id: wallet.user_id().map(|u| u.to_string()),
            total_balance: wallet.total_balance(),
            available_balance: wallet.available_balance(),
            locked_balance: wallet.locked_balance(),
            total_payouts: wallet.total_payouts(),
            total_contributions: wallet.total_contributions(),
            total_withdrawals: wallet.total_withdrawals(),
            linked_bank_accounts: wallet.bank_accounts().iter().map(BankAccountView::from).collect(),
            disabled: wallet.is_disabled(),
        }
    }
}
