//! Persisting the ledger between runs.
//!
//! The service keeps its event store in memory. [`AppServices::spawn_journal`] follows the
//! bus and appends every committed event to an [`EventJournal`]; at startup
//! [`AppServices::restore`] rebuilds the store from the same file.

use std::io;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use ajo_events::EventEnvelope;
use ajo_infra::event_store::EventJournal;
use ajo_infra::workers::{ProjectionWorker, WorkerHandle};

use crate::error::{ServiceError, ServiceResult};
use crate::services::AppServices;

impl AppServices {
    /// Append every event committed from now on to `journal`, on a background thread.
    ///
    /// Events committed before the call are not written; restore first, then spawn.
    pub fn spawn_journal(self: &Arc<Self>, journal: Arc<EventJournal>) -> io::Result<WorkerHandle> {
        let services = Arc::clone(self);
        ProjectionWorker::spawn("ajo-journal", self.bus(), move |envelope: EventEnvelope<JsonValue>| {
            services.journal_envelope(&journal, &envelope)
        })
    }

    fn journal_envelope(&self, journal: &EventJournal, envelope: &EventEnvelope<JsonValue>) -> ServiceResult<()> {
        let stored = self.stored_event(envelope)?;
        journal
            .append(&stored)
            .map_err(|e| ServiceError::internal("journal", e))?;
        debug!(
            aggregate_id = %stored.aggregate_id,
            sequence = stored.sequence_number,
            event_type = %stored.event_type,
            "event journaled"
        );
        Ok(())
    }
}
