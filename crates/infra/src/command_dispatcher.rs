//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate stream from the store
//!   ↓
//! 2. Rehydrate the aggregate (apply historical events)
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed events to the bus
//! ```
//!
//! Step 4 is a compare-and-swap on the stream version. Two writers that loaded the same
//! version cannot both commit: the loser gets `DispatchError::Concurrency`.
//! [`CommandDispatcher::dispatch_with_retry`] reloads and re-decides in that case, so a
//! racing join is re-checked against the capacity it actually sees.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use ajo_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use ajo_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The aggregate rejected the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Stale stream version at append time.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// A loaded stream belongs to another aggregate or is out of order.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// Historical payloads could not be decoded into the aggregate event type.
    #[error("event deserialization failed: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl DispatchError {
    /// The domain error, when the command itself was rejected.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            DispatchError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub struct Dispatched<A: Aggregate> {
    /// Aggregate state after the new events were applied.
    pub state: A,
    /// Decided domain events, in order.
    pub events: Vec<A::Event>,
    /// The same events as persisted.
    pub committed: Vec<StoredEvent>,
}

impl<A: Aggregate> Dispatched<A> {
    /// True when the command was accepted but changed nothing.
    pub fn is_noop(&self) -> bool {
        self.committed.is_empty()
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Publication happens only after a successful append. A bus failure is logged and does not
/// fail the command: the events are already durable and readers rebuild from the store.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    retry_attempts: u32,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    /// Total attempts made by `dispatch_with_retry` (at least one).
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate from its stream without handling a command.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command once.
    ///
    /// A stale version surfaces as `DispatchError::Concurrency`; nothing is written in that
    /// case. A command that decides no events returns the loaded state with no commits.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: ajo_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                state: aggregate,
                events: vec![],
                committed: vec![],
            });
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for ev in &decided {
            aggregate.apply(ev);
        }

        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                warn!(
                    aggregate_id = %aggregate_id,
                    event_type = %stored.event_type,
                    error = ?err,
                    "event committed but publication failed"
                );
            }
        }

        debug!(
            aggregate_id = %aggregate_id,
            aggregate_type,
            events = committed.len(),
            "command dispatched"
        );

        Ok(Dispatched {
            state: aggregate,
            events: decided,
            committed,
        })
    }

    /// Dispatch, reloading and re-deciding on concurrency failures.
    ///
    /// Gives up after `retry_attempts` tries with `DomainError::Conflict`.
    pub fn dispatch_with_retry<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: ajo_events::Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 1;
        loop {
            match self.dispatch(aggregate_id, aggregate_type, command, &make_aggregate) {
                Err(DispatchError::Concurrency(msg)) if attempt < self.retry_attempts => {
                    debug!(aggregate_id = %aggregate_id, attempt, reason = %msg, "retrying after concurrent write");
                    attempt += 1;
                }
                Err(DispatchError::Concurrency(msg)) => {
                    warn!(aggregate_id = %aggregate_id, attempts = attempt, reason = %msg, "giving up after repeated conflicts");
                    return Err(DispatchError::Domain(DomainError::conflict(format!(
                        "{aggregate_type} {aggregate_id} is busy, try again"
                    ))));
                }
                other => return other,
            }
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::CorruptStream(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::CorruptStream(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(format!("{} #{}: {e}", stored.event_type, stored.sequence_number)))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
