use std::collections::HashMap;
use std::sync::RwLock;

use ajo_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Default)]
struct Log {
    streams: HashMap<AggregateId, Vec<StoredEvent>>,
    /// Every committed event in commit order.
    all: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// The whole append (version check, sequence assignment, push) runs under one write
/// lock, so concurrent writers racing on a stream see exactly one winner per version.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a store from previously committed events (e.g. a journal).
    ///
    /// Each stream must hold sequence numbers `1..=n` exactly once and a single aggregate
    /// type; events of one stream may arrive out of order and are sorted back. The global
    /// order keeps the input interleaving of streams.
    pub fn from_history(history: Vec<StoredEvent>) -> Result<Self, EventStoreError> {
        let mut streams: HashMap<AggregateId, Vec<StoredEvent>> = HashMap::new();
        let mut order = Vec::with_capacity(history.len());
        for event in history {
            order.push(event.aggregate_id);
            streams.entry(event.aggregate_id).or_default().push(event);
        }

        for (id, stream) in streams.iter_mut() {
            stream.sort_by_key(|e| e.sequence_number);
            let aggregate_type = stream[0].aggregate_type.clone();
            for (idx, e) in stream.iter().enumerate() {
                let expected = idx as u64 + 1;
                if e.sequence_number != expected {
                    return Err(EventStoreError::InvalidAppend(format!(
                        "stream {id}: expected sequence {expected}, found {}",
                        e.sequence_number
                    )));
                }
                if e.aggregate_type != aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream {id} mixes '{aggregate_type}' and '{}'",
                        e.aggregate_type
                    )));
                }
            }
        }

        let mut cursors: HashMap<AggregateId, usize> = HashMap::new();
        let mut all = Vec::with_capacity(order.len());
        for id in order {
            let next = cursors.entry(id).or_insert(0);
            if let Some(e) = streams.get(&id).and_then(|s| s.get(*next)) {
                all.push(e.clone());
            }
            *next += 1;
        }

        Ok(Self {
            log: RwLock::new(Log { streams, all }),
        })
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn poisoned() -> EventStoreError {
        EventStoreError::Unavailable("lock poisoned".to_string())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut log = self.log.write().map_err(|_| Self::poisoned())?;
        let Log { streams, all } = &mut *log;

        let stream = streams.entry(aggregate_id).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {aggregate_id}: expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            all.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;
        Ok(log.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;
        Ok(log.all.clone())
    }
}
