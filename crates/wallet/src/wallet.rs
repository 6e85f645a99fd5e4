use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ajo_core::money::{credit, debit};
use ajo_core::{Aggregate, AggregateId, AggregateRoot, Amount, DomainError, UserId};
use ajo_events::Event;

use crate::bank_account::{
    BankAccount, BankAccountId, BankAccountRegistry, NewBankAccount,
};

/// Lifetime statistics of a wallet.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStats {
    pub total_contributions: u64,
    pub total_payouts: u64,
    pub total_withdrawals: u64,
}

/// Which lifetime counter a settlement of locked funds feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementPurpose {
    Contribution,
    Withdrawal,
}

/// Aggregate root: Wallet (one per user; stream id == user id).
///
/// `total_balance` is never trusted from input: `apply` recomputes it from
/// `available + locked` after every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    id: AggregateId,
    user_id: Option<UserId>,
    available_balance: u64,
    locked_balance: u64,
    total_balance: u64,
    stats: WalletStats,
    bank_accounts: BankAccountRegistry,
    disabled: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Wallet {
    /// Create an empty, not-yet-opened aggregate instance for rehydration.
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            user_id: None,
            available_balance: 0,
            locked_balance: 0,
            total_balance: 0,
            stats: WalletStats::default(),
            bank_accounts: BankAccountRegistry::new(),
            disabled: false,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self::empty(user_id.into())
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn available_balance(&self) -> u64 {
        self.available_balance
    }

    pub fn locked_balance(&self) -> u64 {
        self.locked_balance
    }

    pub fn total_balance(&self) -> u64 {
        self.total_balance
    }

    pub fn stats(&self) -> WalletStats {
        self.stats
    }

    pub fn total_contributions(&self) -> u64 {
        self.stats.total_contributions
    }

    pub fn total_payouts(&self) -> u64 {
        self.stats.total_payouts
    }

    pub fn total_withdrawals(&self) -> u64 {
        self.stats.total_withdrawals
    }

    pub fn bank_accounts(&self) -> &[BankAccount] {
        self.bank_accounts.accounts()
    }

    pub fn primary_account(&self) -> Option<&BankAccount> {
        self.bank_accounts.primary()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn recompute_total(&mut self) {
        self.total_balance = self.available_balance.saturating_add(self.locked_balance);
    }
}

impl AggregateRoot for Wallet {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenWallet (idempotent get-or-create).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenWallet {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command payload shared by every balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFunds {
    pub user_id: UserId,
    /// Amount in minor units; zero is rejected with `InvalidAmount`.
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SettleLocked (locked funds leave the wallet as a contribution or withdrawal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleLocked {
    pub user_id: UserId,
    pub amount: u64,
    pub purpose: SettlementPurpose,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddBankAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBankAccount {
    pub user_id: UserId,
    pub account_id: BankAccountId,
    pub details: NewBankAccount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPrimaryAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPrimaryAccount {
    pub user_id: UserId,
    pub account_id: BankAccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DisableWallet (soft-disable; wallets are never deleted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableWallet {
    pub user_id: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletCommand {
    Open(OpenWallet),
    AddFunds(MoveFunds),
    DeductFunds(MoveFunds),
    LockFunds(MoveFunds),
    UnlockFunds(MoveFunds),
    RecordContribution(MoveFunds),
    RecordPayout(MoveFunds),
    RecordWithdrawal(MoveFunds),
    SettleLocked(SettleLocked),
    AddBankAccount(AddBankAccount),
    SetPrimaryAccount(SetPrimaryAccount),
    Disable(DisableWallet),
}

impl WalletCommand {
    pub fn user_id(&self) -> UserId {
        match self {
            WalletCommand::Open(c) => c.user_id,
            WalletCommand::AddFunds(c)
            | WalletCommand::DeductFunds(c)
            | WalletCommand::LockFunds(c)
            | WalletCommand::UnlockFunds(c)
            | WalletCommand::RecordContribution(c)
            | WalletCommand::RecordPayout(c)
            | WalletCommand::RecordWithdrawal(c) => c.user_id,
            WalletCommand::SettleLocked(c) => c.user_id,
            WalletCommand::AddBankAccount(c) => c.user_id,
            WalletCommand::SetPrimaryAccount(c) => c.user_id,
            WalletCommand::Disable(c) => c.user_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WalletCommand::Open(c) => c.occurred_at,
            WalletCommand::AddFunds(c)
            | WalletCommand::DeductFunds(c)
            | WalletCommand::LockFunds(c)
            | WalletCommand::UnlockFunds(c)
            | WalletCommand::RecordContribution(c)
            | WalletCommand::RecordPayout(c)
            | WalletCommand::RecordWithdrawal(c) => c.occurred_at,
            WalletCommand::SettleLocked(c) => c.occurred_at,
            WalletCommand::AddBankAccount(c) => c.occurred_at,
            WalletCommand::SetPrimaryAccount(c) => c.occurred_at,
            WalletCommand::Disable(c) => c.occurred_at,
        }
    }
}

/// Event: WalletOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletOpened {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event payload shared by every balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsMovement {
    pub user_id: UserId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LockedFundsSettled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedFundsSettled {
    pub user_id: UserId,
    pub amount: Amount,
    pub purpose: SettlementPurpose,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BankAccountLinked (primary flag already decided).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccountLinked {
    pub user_id: UserId,
    pub account: BankAccount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PrimaryAccountChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryAccountChanged {
    pub user_id: UserId,
    pub account_id: BankAccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WalletDisabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDisabled {
    pub user_id: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletEvent {
    WalletOpened(WalletOpened),
    FundsAdded(FundsMovement),
    FundsDeducted(FundsMovement),
    FundsLocked(FundsMovement),
    FundsUnlocked(FundsMovement),
    ContributionRecorded(FundsMovement),
    PayoutRecorded(FundsMovement),
    WithdrawalRecorded(FundsMovement),
    LockedFundsSettled(LockedFundsSettled),
    BankAccountLinked(BankAccountLinked),
    PrimaryAccountChanged(PrimaryAccountChanged),
    WalletDisabled(WalletDisabled),
}

impl Event for WalletEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::WalletOpened(_) => "wallet.opened",
            WalletEvent::FundsAdded(_) => "wallet.funds_added",
            WalletEvent::FundsDeducted(_) => "wallet.funds_deducted",
            WalletEvent::FundsLocked(_) => "wallet.funds_locked",
            WalletEvent::FundsUnlocked(_) => "wallet.funds_unlocked",
            WalletEvent::ContributionRecorded(_) => "wallet.contribution_recorded",
            WalletEvent::PayoutRecorded(_) => "wallet.payout_recorded",
            WalletEvent::WithdrawalRecorded(_) => "wallet.withdrawal_recorded",
            WalletEvent::LockedFundsSettled(_) => "wallet.locked_funds_settled",
            WalletEvent::BankAccountLinked(_) => "wallet.bank_account_linked",
            WalletEvent::PrimaryAccountChanged(_) => "wallet.primary_account_changed",
            WalletEvent::WalletDisabled(_) => "wallet.disabled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WalletEvent::WalletOpened(e) => e.occurred_at,
            WalletEvent::FundsAdded(e)
            | WalletEvent::FundsDeducted(e)
            | WalletEvent::FundsLocked(e)
            | WalletEvent::FundsUnlocked(e)
            | WalletEvent::ContributionRecorded(e)
            | WalletEvent::PayoutRecorded(e)
            | WalletEvent::WithdrawalRecorded(e) => e.occurred_at,
            WalletEvent::LockedFundsSettled(e) => e.occurred_at,
            WalletEvent::BankAccountLinked(e) => e.occurred_at,
            WalletEvent::PrimaryAccountChanged(e) => e.occurred_at,
            WalletEvent::WalletDisabled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Wallet {
    type Command = WalletCommand;
    type Event = WalletEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        // Amounts were validated by `handle`; saturating ops only guard replays.
        match event {
            WalletEvent::WalletOpened(e) => {
                self.user_id = Some(e.user_id);
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            WalletEvent::FundsAdded(e) => {
                self.available_balance = self.available_balance.saturating_add(e.amount.get());
            }
            WalletEvent::FundsDeducted(e) => {
                self.available_balance = self.available_balance.saturating_sub(e.amount.get());
            }
            WalletEvent::FundsLocked(e) => {
                self.available_balance = self.available_balance.saturating_sub(e.amount.get());
                self.locked_balance = self.locked_balance.saturating_add(e.amount.get());
            }
            WalletEvent::FundsUnlocked(e) => {
                self.locked_balance = self.locked_balance.saturating_sub(e.amount.get());
                self.available_balance = self.available_balance.saturating_add(e.amount.get());
            }
            WalletEvent::ContributionRecorded(e) => {
                self.available_balance = self.available_balance.saturating_sub(e.amount.get());
                self.stats.total_contributions =
                    self.stats.total_contributions.saturating_add(e.amount.get());
            }
            WalletEvent::PayoutRecorded(e) => {
                self.available_balance = self.available_balance.saturating_add(e.amount.get());
                self.stats.total_payouts = self.stats.total_payouts.saturating_add(e.amount.get());
            }
            WalletEvent::WithdrawalRecorded(e) => {
                self.available_balance = self.available_balance.saturating_sub(e.amount.get());
                self.stats.total_withdrawals =
                    self.stats.total_withdrawals.saturating_add(e.amount.get());
            }
            WalletEvent::LockedFundsSettled(e) => {
                self.locked_balance = self.locked_balance.saturating_sub(e.amount.get());
                let counter = match e.purpose {
                    SettlementPurpose::Contribution => &mut self.stats.total_contributions,
                    SettlementPurpose::Withdrawal => &mut self.stats.total_withdrawals,
                };
                *counter = counter.saturating_add(e.amount.get());
            }
            WalletEvent::BankAccountLinked(e) => {
                self.bank_accounts.link(e.account.clone());
            }
            WalletEvent::PrimaryAccountChanged(e) => {
                self.bank_accounts.set_primary(e.account_id);
            }
            WalletEvent::WalletDisabled(_) => {
                self.disabled = true;
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.recompute_total();

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let user_id = command.user_id();
        self.ensure_owner(user_id)?;

        if let WalletCommand::Open(_) = command {
            if self.created {
                return Ok(vec![]);
            }
        } else if self.disabled {
            return Err(DomainError::invalid_transition("wallet is disabled"));
        }

        // First access opens the wallet in the same atomic batch.
        let mut events = Vec::with_capacity(2);
        if !self.created {
            events.push(WalletEvent::WalletOpened(WalletOpened {
                user_id,
                occurred_at: command.occurred_at(),
            }));
        }

        let decided = match command {
            WalletCommand::Open(_) => None,
            WalletCommand::AddFunds(cmd) => Some(self.handle_add_funds(cmd)?),
            WalletCommand::DeductFunds(cmd) => Some(self.handle_deduct_funds(cmd)?),
            WalletCommand::LockFunds(cmd) => Some(self.handle_lock_funds(cmd)?),
            WalletCommand::UnlockFunds(cmd) => Some(self.handle_unlock_funds(cmd)?),
            WalletCommand::RecordContribution(cmd) => Some(self.handle_record_contribution(cmd)?),
            WalletCommand::RecordPayout(cmd) => Some(self.handle_record_payout(cmd)?),
            WalletCommand::RecordWithdrawal(cmd) => Some(self.handle_record_withdrawal(cmd)?),
            WalletCommand::SettleLocked(cmd) => Some(self.handle_settle_locked(cmd)?),
            WalletCommand::AddBankAccount(cmd) => Some(self.handle_add_bank_account(cmd)?),
            WalletCommand::SetPrimaryAccount(cmd) => Some(self.handle_set_primary(cmd)?),
            WalletCommand::Disable(cmd) => Some(self.handle_disable(cmd)),
        };

        events.extend(decided);
        Ok(events)
    }
}

impl Wallet {
    fn ensure_owner(&self, user_id: UserId) -> Result<(), DomainError> {
        if AggregateId::from(user_id) != self.id {
            return Err(DomainError::invariant("wallet id does not match user"));
        }
        if self.created && self.user_id != Some(user_id) {
            return Err(DomainError::invariant("wallet owner mismatch"));
        }
        Ok(())
    }

    fn movement(cmd: &MoveFunds) -> Result<FundsMovement, DomainError> {
        Ok(FundsMovement {
            user_id: cmd.user_id,
            amount: Amount::new(cmd.amount)?,
            occurred_at: cmd.occurred_at,
        })
    }

    fn handle_add_funds(&self, cmd: &MoveFunds) -> Result<WalletEvent, DomainError> {
        let m = Self::movement(cmd)?;
        credit(self.available_balance, m.amount, "available balance")?;
        Ok(WalletEvent::FundsAdded(m))
    }

    fn handle_deduct_funds(&self, cmd: &MoveFunds) -> Result<WalletEvent, DomainError> {
        let m = Self::movement(cmd)?;
        debit(self.available_balance, m.amount, "available balance")?;
        Ok(WalletEvent::FundsDeducted(m))
    }

    fn handle_lock_funds(&self, cmd: &MoveFunds) -> Result<WalletEvent, DomainError> {
        let m = Self::movement(cmd)?;
        debit(self.available_balance, m.amount, "available balance")?;
        credit(self.locked_balance, m.amount, "locked balance")?;
        Ok(WalletEvent::FundsLocked(m))
    }

    fn handle_unlock_funds(&self, cmd: &MoveFunds) -> Result<WalletEvent, DomainError> {
        let m = Self::movement(cmd)?;
        debit(self.locked_balance, m.amount, "locked balance")?;
        credit(self.available_balance, m.amount, "available balance")?;
        Ok(WalletEvent::FundsUnlocked(m))
    }

    fn handle_record_contribution(&self, cmd: &MoveFunds) -> Result<WalletEvent, DomainError> {
        let m = Self::movement(cmd)?;
        debit(self.available_balance, m.amount, "available balance")?;
        credit(self.stats.total_contributions, m.amount, "total contributions")?;
        Ok(WalletEvent::ContributionRecorded(m))
    }

    fn handle_record_payout(&self, cmd: &MoveFunds) -> Result<WalletEvent, DomainError> {
        let m = Self::movement(cmd)?;
        credit(self.available_balance, m.amount, "available balance")?;
        credit(self.stats.total_payouts, m.amount, "total payouts")?;
        Ok(WalletEvent::PayoutRecorded(m))
    }

    fn handle_record_withdrawal(&self, cmd: &MoveFunds) -> Result<WalletEvent, DomainError> {
        let m = Self::movement(cmd)?;
        debit(self.available_balance, m.amount, "available balance")?;
        credit(self.stats.total_withdrawals, m.amount, "total withdrawals")?;
        Ok(WalletEvent::WithdrawalRecorded(m))
    }

    fn handle_settle_locked(&self, cmd: &SettleLocked) -> Result<WalletEvent, DomainError> {
        let amount = Amount::new(cmd.amount)?;
        debit(self.locked_balance, amount, "locked balance")?;
        let counter = match cmd.purpose {
            SettlementPurpose::Contribution => self.stats.total_contributions,
            SettlementPurpose::Withdrawal => self.stats.total_withdrawals,
        };
        credit(counter, amount, "lifetime counter")?;

        Ok(WalletEvent::LockedFundsSettled(LockedFundsSettled {
            user_id: cmd.user_id,
            amount,
            purpose: cmd.purpose,
            occurred_at: cmd.occurred_at,
        }))
    }

    fn handle_add_bank_account(&self, cmd: &AddBankAccount) -> Result<WalletEvent, DomainError> {
        let account = self
            .bank_accounts
            .prepare(cmd.account_id, &cmd.details, cmd.occurred_at)?;

        Ok(WalletEvent::BankAccountLinked(BankAccountLinked {
            user_id: cmd.user_id,
            account,
            occurred_at: cmd.occurred_at,
        }))
    }

    fn handle_set_primary(&self, cmd: &SetPrimaryAccount) -> Result<WalletEvent, DomainError> {
        if self.bank_accounts.get(cmd.account_id).is_none() {
            return Err(DomainError::not_found("bank account"));
        }

        Ok(WalletEvent::PrimaryAccountChanged(PrimaryAccountChanged {
            user_id: cmd.user_id,
            account_id: cmd.account_id,
            occurred_at: cmd.occurred_at,
        }))
    }

    fn handle_disable(&self, cmd: &DisableWallet) -> WalletEvent {
        WalletEvent::WalletDisabled(WalletDisabled {
            user_id: cmd.user_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })
    }
}
