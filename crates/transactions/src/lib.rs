//! Transaction ledger (event-sourced).
//!
//! Immutable-once-settled audit records of contributions, payouts and
//! withdrawals. A record is created `pending` and moves exactly once to
//! `completed`, `failed` or `cancelled`.

pub mod id;
pub mod stats;
pub mod transaction;
pub mod view;

pub use id::TransactionId;
pub use stats::{TransactionStats, TypeTotals};
pub use transaction::{
    CancelTransaction, MarkCompleted, MarkFailed, PaymentDetails, PaymentMethod,
    RecordTransaction, Transaction, TransactionCancelled, TransactionCommand,
    TransactionCompleted, TransactionEvent, TransactionFailed, TransactionRecorded,
    TransactionStatus, TransactionType,
};
pub use view::TransactionView;

/// Aggregate type tag of the event streams owned by this crate.
pub const AGGREGATE_TYPE: &str = "transaction";
