//! Read model storage: disposable keyed stores and uniqueness indexes.

pub mod keyed_store;
pub mod unique_index;

pub use keyed_store::{InMemoryKeyedStore, KeyedStore};
pub use unique_index::{Reservation, UniqueIndex};
