use serde_json::Value as JsonValue;

use ajo_core::{Aggregate, AggregateId, AggregateRoot, UserId};
use ajo_events::{EventEnvelope, Projection};
use ajo_transactions::{Transaction, TransactionEvent, TransactionId, TransactionStats};

use crate::event_store::StoredEvent;
use crate::projections::feed::{ReadModelError, StreamFeed};
use crate::read_model::KeyedStore;

#[derive(Debug)]
pub struct TransactionLog<S> {
    store: S,
}

impl<S> Projection for TransactionLog<S>
where
    S: KeyedStore<AggregateId, Transaction>,
{
    type Ev = TransactionEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        let id = envelope.aggregate_id();
        let mut tx = self.store.get(&id).unwrap_or_else(|| Transaction::empty(id));
        tx.apply(envelope.payload());
        self.store.upsert(id, tx);
    }
}

/// Per-user transaction history and totals.
#[derive(Debug)]
pub struct TransactionHistoryProjection<S>
where
    S: KeyedStore<AggregateId, Transaction> + Clone,
{
    store: S,
    feed: StreamFeed<TransactionLog<S>>,
}

impl<S> TransactionHistoryProjection<S>
where
    S: KeyedStore<AggregateId, Transaction> + Clone,
{
    pub fn new(store: S) -> Self {
        let feed = StreamFeed::new(ajo_transactions::AGGREGATE_TYPE, TransactionLog { store: store.clone() });
        Self { store, feed }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ReadModelError> {
        self.feed.apply_envelope(envelope)
    }

    pub fn apply_committed(&self, committed: &[StoredEvent]) -> Result<(), ReadModelError> {
        for stored in committed {
            self.feed.apply_envelope(&stored.to_envelope())?;
        }
        Ok(())
    }

    pub fn rebuild_from_scratch(&self, history: &[StoredEvent]) -> Result<(), ReadModelError> {
        self.store.clear();
        self.feed.rebuild(TransactionLog { store: self.store.clone() }, history)
    }

    pub fn get(&self, transaction_id: TransactionId) -> Option<Transaction> {
        self.store.get(&transaction_id.aggregate_id())
    }

    pub fn all(&self) -> Vec<Transaction> {
        self.store.list()
    }

    /// The user's transactions, newest first.
    pub fn for_user(&self, user_id: UserId) -> Vec<Transaction> {
        let mut txs: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|tx| tx.user_id() == Some(user_id))
            .collect();
        txs.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(a.id())));
        txs
    }

    pub fn stats_for(&self, user_id: UserId) -> TransactionStats {
        TransactionStats::from_transactions(&self.for_user(user_id))
    }
}
