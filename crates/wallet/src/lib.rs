//! Wallet ledger (event-sourced).
//!
//! One wallet per user: available, locked and total balances, lifetime
//! contribution/payout/withdrawal statistics, and the linked bank accounts used
//! for withdrawals. Pure domain logic only: no IO, no persistence concerns.

pub mod bank_account;
pub mod view;
pub mod wallet;

pub use bank_account::{
    BankAccount, BankAccountId, BankAccountRegistry, NewBankAccount, RecipientReference,
};
pub use view::{BankAccountView, WalletView};
pub use wallet::{
    AddBankAccount, BankAccountLinked, DisableWallet, FundsMovement, LockedFundsSettled,
    MoveFunds, OpenWallet, PrimaryAccountChanged, SetPrimaryAccount, SettleLocked,
    SettlementPurpose, Wallet, WalletCommand, WalletDisabled, WalletEvent, WalletOpened,
    WalletStats,
};

/// Aggregate type tag of the event streams owned by this crate.
pub const AGGREGATE_TYPE: &str = "wallet";
