use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use ajo_events::{EventEnvelope, Projection, ProjectionError, ProjectionRunner};

use crate::event_store::StoredEvent;

#[derive(Debug, Error)]
pub enum ReadModelError {
    #[error("failed to deserialize {aggregate_type} payload: {reason}")]
    Deserialize { aggregate_type: String, reason: String },

    #[error(transparent)]
    Sequence(#[from] ProjectionError),

    #[error("projection state poisoned")]
    Poisoned,
}

/// Feeds published JSON envelopes of one aggregate type into a typed projection.
///
/// Envelopes of other aggregate types are ignored, so one bus can carry every stream.
/// Cursor tracking (duplicates skipped, gaps reported) is delegated to `ProjectionRunner`.
#[derive(Debug)]
pub(crate) struct StreamFeed<P: Projection> {
    aggregate_type: &'static str,
    runner: Mutex<ProjectionRunner<P>>,
}

impl<P> StreamFeed<P>
where
    P: Projection,
    P::Ev: DeserializeOwned,
{
    pub(crate) fn new(aggregate_type: &'static str, projection: P) -> Self {
        Self {
            aggregate_type,
            runner: Mutex::new(ProjectionRunner::new(projection)),
        }
    }

    /// Returns `Ok(true)` when the envelope changed the read model.
    pub(crate) fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ReadModelError> {
        if envelope.aggregate_type() != self.aggregate_type {
            return Ok(false);
        }
        let typed = decode::<P::Ev>(envelope)?;
        let mut runner = self.runner.lock().map_err(|_| ReadModelError::Poisoned)?;
        Ok(runner.apply(&typed)?)
    }

    /// Swap in a fresh projection and replay `history` (commit order) through it.
    pub(crate) fn rebuild(&self, projection: P, history: &[StoredEvent]) -> Result<(), ReadModelError> {
        let mut typed = Vec::new();
        for stored in history.iter().filter(|e| e.aggregate_type == self.aggregate_type) {
            typed.push(decode::<P::Ev>(&stored.to_envelope())?);
        }
        let mut runner = self.runner.lock().map_err(|_| ReadModelError::Poisoned)?;
        *runner = ProjectionRunner::rebuild_from_scratch(|| projection, &typed)?;
        Ok(())
    }

    pub(crate) fn cursor(&self, aggregate_id: ajo_core::AggregateId) -> u64 {
        self.runner.lock().map(|r| r.cursor(aggregate_id)).unwrap_or(0)
    }
}

fn decode<E: DeserializeOwned>(envelope: &EventEnvelope<JsonValue>) -> Result<EventEnvelope<E>, ReadModelError> {
    let payload: E = serde_json::from_value(envelope.payload().clone()).map_err(|e| ReadModelError::Deserialize {
        aggregate_type: envelope.aggregate_type().to_string(),
        reason: e.to_string(),
    })?;
    Ok(EventEnvelope::new(
        envelope.event_id(),
        envelope.aggregate_id(),
        envelope.aggregate_type(),
        envelope.sequence_number(),
        payload,
    ))
}
