//! Money amounts in minor currency units.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A strictly positive amount of money in the smallest currency unit (e.g. kobo).
///
/// Balances themselves are plain `u64` (zero is a valid balance); `Amount` is what
/// ledger operations accept, so a zero amount is rejected once, at construction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Amount(u64);

impl Amount {
    pub fn new(minor_units: u64) -> DomainResult<Self> {
        if minor_units == 0 {
            return Err(DomainError::InvalidAmount);
        }
        Ok(Self(minor_units))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl ValueObject for Amount {}

impl TryFrom<u64> for Amount {
    type Error = DomainError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for u64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// `balance + amount`, reporting overflow as an invariant violation.
pub fn credit(balance: u64, amount: Amount, what: &str) -> DomainResult<u64> {
    balance
        .checked_add(amount.get())
        .ok_or_else(|| DomainError::invariant(format!("{what} overflow")))
}

/// `balance - amount`, failing with `InsufficientFunds` instead of going negative.
pub fn debit(balance: u64, amount: Amount, what: &str) -> DomainResult<u64> {
    balance.checked_sub(amount.get()).ok_or_else(|| {
        DomainError::insufficient_funds(format!(
            "{what} is {balance}, requested {}",
            amount.get()
        ))
    })
}
