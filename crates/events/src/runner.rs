//! Projection runner: cursor tracking and replay.
//!
//! Read models are **disposable**; events are the source of truth. The runner keeps
//! one cursor per aggregate stream so redelivered envelopes are skipped and gaps
//! are reported.

use std::collections::HashMap;

use ajo_core::AggregateId;
use thiserror::Error;

use crate::{EventEnvelope, Projection};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("sequence gap in stream {aggregate_id} (last={last}, found={found})")]
    SequenceGap {
        aggregate_id: AggregateId,
        last: u64,
        found: u64,
    },
}

/// Runs envelopes through a projection and tracks per-stream progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursors: HashMap<AggregateId, u64>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursors: HashMap::new(),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Last applied sequence number for a stream (0 when nothing was applied).
    pub fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        self.cursors.get(&aggregate_id).copied().unwrap_or(0)
    }

    /// Apply one envelope.
    ///
    /// Returns `Ok(false)` for an already-applied (duplicate) envelope and an error
    /// when the envelope would skip ahead of the next expected position.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<bool, ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let last = self.cursor(aggregate_id);
        let found = envelope.sequence_number();

        if found <= last {
            return Ok(false);
        }
        if found != last + 1 {
            return Err(ProjectionError::SequenceGap {
                aggregate_id,
                last,
                found,
            });
        }

        self.projection.apply(envelope);
        self.cursors.insert(aggregate_id, found);
        Ok(true)
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying history.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<Self, ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok(runner)
    }
}
