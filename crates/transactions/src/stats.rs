use serde::{Deserialize, Serialize};

use crate::transaction::{Transaction, TransactionStatus, TransactionType};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeTotals {
    pub total: u64,
    pub count: u64,
}

impl TypeTotals {
    fn add(&mut self, amount: u64) {
        self.total = self.total.saturating_add(amount);
        self.count += 1;
    }
}

/// Per-type totals over a user's completed transactions.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStats {
    pub contributions: TypeTotals,
    pub payouts: TypeTotals,
    pub withdrawals: TypeTotals,
}

impl TransactionStats {
    /// Fold one record in; anything not completed is ignored.
    pub fn record(&mut self, kind: TransactionType, status: TransactionStatus, amount: u64) {
        if status != TransactionStatus::Completed {
            return;
        }
        match kind {
            TransactionType::Contribution => self.contributions.add(amount),
            TransactionType::Payout => self.payouts.add(amount),
            TransactionType::Withdrawal => self.withdrawals.add(amount),
        }
    }

    pub fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut stats = Self::default();
        for tx in transactions {
            stats.record(tx.kind(), tx.status(), tx.amount());
        }
        stats
    }
}
