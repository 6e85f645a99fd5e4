use crate::{Event, EventEnvelope};

/// A projection builds a read model from committed ledger events.
///
/// Read models answer the queries the aggregates cannot answer cheaply on their
/// own: "which groups is this user in", "what has this user paid in this year".
/// They are disposable and can be rebuilt by replaying the event store.
///
/// `apply` must be idempotent with respect to redelivery; `ProjectionRunner`
/// enforces that by skipping sequence numbers it has already seen per stream.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
