use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::transaction::{PaymentMethod, Transaction, TransactionStatus, TransactionType};

/// Transaction as returned to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub transaction_id: String,
    pub user_id: String,
    pub group_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: u64,
    pub status: TransactionStatus,
    pub payment_method: PaymentMethod,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub supersedes: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.transaction_id().map(|id| id.to_string()).unwrap_or_default(),
            user_id: tx.user_id().map(|id| id.to_string()).unwrap_or_default(),
            group_id: tx.group_id().map(|id| id.to_string()),
            kind: tx.kind(),
            amount: tx.amount(),
            status: tx.status(),
            payment_method: tx.payment_method(),
            description: tx.description().map(str::to_string),
            reference: tx.reference().map(str::to_string),
            supersedes: tx.supersedes().map(|id| id.to_string()),
            failure_reason: tx.failure_reason().map(str::to_string),
            created_at: tx.created_at(),
            completed_at: tx.completed_at(),
        }
    }
}
