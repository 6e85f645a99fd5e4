//! Linked bank accounts (child records of a wallet).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ajo_core::{DomainError, Entity};

/// Identifier of a linked bank account, unique within its wallet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BankAccountId(pub Uuid);

impl BankAccountId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BankAccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for BankAccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Opaque token issued by the payment processor for transfers to an account.
///
/// Persisted with the account so withdrawals can use it, but never part of any
/// outward-facing view. `Debug` is redacted so it cannot leak through logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientReference(String);

impl RecipientReference {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for RecipientReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("RecipientReference(<redacted>)")
    }
}

/// Details supplied when linking an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBankAccount {
    pub account_number: String,
    pub bank_code: String,
    pub bank_name: String,
    pub account_name: String,
    pub is_primary: bool,
    pub is_verified: bool,
    pub recipient_reference: Option<RecipientReference>,
}

/// A bank account linked to a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub account_id: BankAccountId,
    pub account_number: String,
    pub bank_code: String,
    pub bank_name: String,
    pub account_name: String,
    pub is_primary: bool,
    pub is_verified: bool,
    pub recipient_reference: Option<RecipientReference>,
    pub added_at: DateTime<Utc>,
}

impl BankAccount {
    pub fn matches(&self, account_number: &str, bank_code: &str) -> bool {
        self.account_number == account_number && self.bank_code == bank_code
    }
}

impl Entity for BankAccount {
    type Id = BankAccountId;

    fn id(&self) -> &Self::Id {
        &self.account_id
    }
}

/// The ordered set of accounts owned by one wallet.
///
/// Enforces:
/// - at most one primary account, and the first account is always primary;
/// - `(account_number, bank_code)` is unique within the wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankAccountRegistry {
    accounts: Vec<BankAccount>,
}

impl BankAccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounts(&self) -> &[BankAccount] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, account_id: BankAccountId) -> Option<&BankAccount> {
        self.accounts.iter().find(|a| a.account_id == account_id)
    }

    pub fn primary(&self) -> Option<&BankAccount> {
        self.accounts.iter().find(|a| a.is_primary)
    }

    pub fn contains(&self, account_number: &str, bank_code: &str) -> bool {
        self.accounts
            .iter()
            .any(|a| a.matches(account_number, bank_code))
    }

    /// Validate `details` and build the record that linking would add.
    pub fn prepare(
        &self,
        account_id: BankAccountId,
        details: &NewBankAccount,
        added_at: DateTime<Utc>,
    ) -> Result<BankAccount, DomainError> {
        let account_number = details.account_number.trim();
        let bank_code = details.bank_code.trim();

        if account_number.is_empty() {
            return Err(DomainError::validation("account number cannot be empty"));
        }
        if bank_code.is_empty() {
            return Err(DomainError::validation("bank code cannot be empty"));
        }
        if details.account_name.trim().is_empty() {
            return Err(DomainError::validation("account name cannot be empty"));
        }
        if self.contains(account_number, bank_code) {
            return Err(DomainError::DuplicateAccount);
        }
        if self.get(account_id).is_some() {
            return Err(DomainError::conflict("bank account id already in use"));
        }

        Ok(BankAccount {
            account_id,
            account_number: account_number.to_string(),
            bank_code: bank_code.to_string(),
            bank_name: details.bank_name.trim().to_string(),
            account_name: details.account_name.trim().to_string(),
            is_primary: self.accounts.is_empty() || details.is_primary,
            is_verified: details.is_verified,
            recipient_reference: details.recipient_reference.clone(),
            added_at,
        })
    }

    /// Append a prepared account, clearing other primaries when it is primary.
    pub fn link(&mut self, account: BankAccount) {
        if account.is_primary {
            for existing in &mut self.accounts {
                existing.is_primary = false;
            }
        }
        self.accounts.push(account);
    }

    /// Move the primary flag to `account_id` (no-op for unknown ids).
    pub fn set_primary(&mut self, account_id: BankAccountId) {
        if self.get(account_id).is_none() {
            return;
        }
        for account in &mut self.accounts {
            account.is_primary = account.account_id == account_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(number: &str, primary: bool) -> NewBankAccount {
        NewBankAccount {
            account_number: number.to_string(),
            bank_code: "058".to_string(),
            bank_name: "GTBank".to_string(),
            account_name: "Ada Obi".to_string(),
            is_primary: primary,
            is_verified: true,
            recipient_reference: Some(RecipientReference::new("RCP_1")),
        }
    }

    fn link(reg: &mut BankAccountRegistry, number: &str, primary: bool) -> BankAccountId {
        let account = reg.prepare(BankAccountId::new(), &details(number, primary), Utc::now()).unwrap();
        let id = account.account_id;
        reg.link(account);
        id
    }

    #[test]
    fn first_account_is_primary_even_if_not_requested() {
        let mut reg = BankAccountRegistry::new();
        let first = link(&mut reg, "0123456789", false);
        assert_eq!(reg.primary().unwrap().account_id, first);
    }

    #[test]
    fn explicit_primary_clears_previous_primary() {
        let mut reg = BankAccountRegistry::new();
        let first = link(&mut reg, "0123456789", false);
        let second = link(&mut reg, "9876543210", false);
        assert_eq!(reg.primary().unwrap().account_id, first);

        let third = link(&mut reg, "1111111111", true);
        assert_eq!(reg.primary().unwrap().account_id, third);
        assert_eq!(reg.accounts().iter().filter(|a| a.is_primary).count(), 1);

        reg.set_primary(second);
        assert_eq!(reg.primary().unwrap().account_id, second);
        assert_eq!(reg.accounts().iter().filter(|a| a.is_primary).count(), 1);
    }

    #[test]
    fn duplicate_number_and_bank_code_is_rejected() {
        let mut reg = BankAccountRegistry::new();
        link(&mut reg, "0123456789", false);

        let err = reg
            .prepare(BankAccountId::new(), &details(" 0123456789 ", false), Utc::now())
            .unwrap_err();
        assert_eq!(err, DomainError::DuplicateAccount);
    }

    #[test]
    fn same_number_at_another_bank_is_allowed() {
        let mut reg = BankAccountRegistry::new();
        link(&mut reg, "0123456789", false);

        let mut other = details("0123456789", false);
        other.bank_code = "044".to_string();
        assert!(reg.prepare(BankAccountId::new(), &other, Utc::now()).is_ok());
    }

    #[test]
    fn recipient_reference_debug_is_redacted() {
        let r = RecipientReference::new("RCP_secret");
        assert!(!format!("{r:?}").contains("secret"));
        assert_eq!(r.expose(), "RCP_secret");
    }
}
