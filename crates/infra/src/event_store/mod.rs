//! Append-only event store boundary.
//!
//! Streams are keyed by aggregate id and guarded by optimistic concurrency. The in-memory
//! implementation backs the service and the tests; `EventJournal` persists it to a
//! JSON-lines file between runs.

pub mod in_memory;
pub mod journal;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use journal::{EventJournal, JournalError};
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
