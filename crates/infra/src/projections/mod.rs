//! Projections (read model builders).
//!
//! All projections are:
//! - **Rebuildable**: reconstructed from `EventStore::load_all`
//! - **Idempotent**: redelivered envelopes are skipped per stream
//! - **Selective**: envelopes of other aggregate types are ignored

mod feed;
pub mod group_directory;
pub mod transaction_history;

pub use feed::ReadModelError;
pub use group_directory::{GroupDirectory, GroupDirectoryProjection};
pub use transaction_history::{TransactionHistoryProjection, TransactionLog};
