//! Application services.
//!
//! Each service method is a short synchronous flow over one or more aggregate streams.
//! Single-stream changes go through `dispatch_with_retry`; multi-stream flows (contribution,
//! payout, withdrawal) order their steps so that every failure after the first write has an
//! explicit compensation.

mod contributions;
mod groups;
mod transactions;
mod wallets;

pub use contributions::{ContributionRequest, PayoutOutcome};
pub use groups::CreateGroupRequest;
pub use wallets::AddBankAccountRequest;

use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::error;

use ajo_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use ajo_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use ajo_groups::{Group, InvitationCode};
use ajo_infra::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use ajo_infra::projections::{GroupDirectoryProjection, ReadModelError, TransactionHistoryProjection};
use ajo_infra::read_model::{InMemoryKeyedStore, UniqueIndex};
use ajo_infra::{CommandDispatcher, Dispatched};
use ajo_transactions::{Transaction, TransactionId, TransactionStatus};

use crate::collaborators::{BankAccountVerifier, TransferGateway};
use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};

pub type EnvelopeBus = InMemoryEventBus<EventEnvelope<JsonValue>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<EnvelopeBus>>;
type Directory = GroupDirectoryProjection<Arc<InMemoryKeyedStore<AggregateId, Group>>>;
type History = TransactionHistoryProjection<Arc<InMemoryKeyedStore<AggregateId, Transaction>>>;

/// The ledger application: event store, read models, uniqueness indexes and collaborators.
pub struct AppServices {
    config: AppConfig,
    dispatcher: Dispatcher,
    directory: Directory,
    history: History,
    invitation_codes: UniqueIndex<InvitationCode, AggregateId>,
    payment_references: UniqueIndex<String, TransactionId>,
    /// Failed transaction -> the retry that supersedes it.
    retries: UniqueIndex<TransactionId, TransactionId>,
    verifier: Arc<dyn BankAccountVerifier>,
    gateway: Arc<dyn TransferGateway>,
    rng: Mutex<StdRng>,
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("config", &self.config)
            .field("invitation_codes", &self.invitation_codes.len())
            .field("payment_references", &self.payment_references.len())
            .field("retries", &self.retries.len())
            .finish_non_exhaustive()
    }
}

impl AppServices {
    pub fn new(config: AppConfig, verifier: Arc<dyn BankAccountVerifier>, gateway: Arc<dyn TransferGateway>) -> Self {
        Self::with_store(config, InMemoryEventStore::new(), verifier, gateway)
    }

    /// Rebuild the ledger from previously committed events (e.g. an `EventJournal`): the
    /// store, both read models and the uniqueness indexes.
    pub fn restore(
        config: AppConfig,
        verifier: Arc<dyn BankAccountVerifier>,
        gateway: Arc<dyn TransferGateway>,
        history: Vec<StoredEvent>,
    ) -> ServiceResult<Self> {
        let store = InMemoryEventStore::from_history(history).map_err(|e| ServiceError::internal("restore", e))?;
        let services = Self::with_store(config, store, verifier, gateway);
        services.rebuild_read_models()?;
        Ok(services)
    }

    fn with_store(
        config: AppConfig,
        store: InMemoryEventStore,
        verifier: Arc<dyn BankAccountVerifier>,
        gateway: Arc<dyn TransferGateway>,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(Arc::new(store), Arc::new(EnvelopeBus::new()))
            .with_retry_attempts(config.dispatch_retry_attempts);

        Self {
            config,
            dispatcher,
            directory: GroupDirectoryProjection::new(Arc::new(InMemoryKeyedStore::new())),
            history: TransactionHistoryProjection::new(Arc::new(InMemoryKeyedStore::new())),
            invitation_codes: UniqueIndex::new(),
            payment_references: UniqueIndex::new(),
            retries: UniqueIndex::new(),
            verifier,
            gateway,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the randomness source (invitation codes, random turn order).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Every committed event, as published after append.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    /// Every committed event, in commit order.
    pub fn committed_events(&self) -> ServiceResult<Vec<StoredEvent>> {
        self.dispatcher
            .store()
            .load_all()
            .map_err(|e| ServiceError::internal("committed_events", e))
    }

    /// The stored form of a published envelope.
    pub(crate) fn stored_event(&self, envelope: &EventEnvelope<JsonValue>) -> ServiceResult<StoredEvent> {
        let stream = self
            .dispatcher
            .store()
            .load_stream(envelope.aggregate_id())
            .map_err(|e| ServiceError::internal("stored_event", e))?;
        stream
            .into_iter()
            .find(|e| e.sequence_number == envelope.sequence_number())
            .ok_or_else(|| {
                ServiceError::internal(
                    "stored_event",
                    format!(
                        "stream {} has no event {}",
                        envelope.aggregate_id(),
                        envelope.sequence_number()
                    ),
                )
            })
    }

    pub(crate) fn bus(&self) -> &EnvelopeBus {
        self.dispatcher.bus()
    }

    /// Clear both read models, replay the event store into them and re-reserve the keys
    /// held by committed groups and transactions.
    pub fn rebuild_read_models(&self) -> ServiceResult<()> {
        let history = self.committed_events()?;
        self.directory.rebuild_from_scratch(&history)?;
        self.history.rebuild_from_scratch(&history)?;
        self.reindex();
        Ok(())
    }

    fn reindex(&self) {
        for group in self.directory.all() {
            if let Some(code) = group.invitation_code() {
                self.invitation_codes.reserve(code.clone(), *group.id());
            }
        }
        for tx in self.history.all() {
            let Some(id) = tx.transaction_id() else { continue };
            if tx.status() == TransactionStatus::Failed {
                continue;
            }
            if let Some(reference) = tx.reference() {
                self.payment_references.reserve(reference.to_string(), id);
            }
            if let Some(failed) = tx.supersedes() {
                self.retries.reserve(failed, id);
            }
        }
    }

    fn with_rng_mut<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> ServiceResult<T> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| ServiceError::internal("rng", "randomness source poisoned"))?;
        Ok(f(&mut rng))
    }

    /// Dispatch with retry and fold the committed events into the read models.
    fn execute<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> ServiceResult<Dispatched<A>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: ajo_events::Event + Serialize + DeserializeOwned,
    {
        let dispatched = self
            .dispatcher
            .dispatch_with_retry(aggregate_id, aggregate_type, command, make_aggregate)?;
        self.project(&dispatched.committed)?;
        Ok(dispatched)
    }

    fn load<A>(&self, aggregate_id: AggregateId, make_aggregate: impl FnOnce(AggregateId) -> A) -> ServiceResult<A>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        Ok(self.dispatcher.load(aggregate_id, make_aggregate)?)
    }

    /// Apply committed events to every read model.
    ///
    /// Writers on the same stream may project out of order; a gap is closed by replaying the
    /// stream from the store, and the late writer's events are then skipped as duplicates.
    fn project(&self, committed: &[StoredEvent]) -> ServiceResult<()> {
        for stored in committed {
            let envelope = stored.to_envelope();
            let applied = self
                .directory
                .apply_envelope(&envelope)
                .and_then(|_| self.history.apply_envelope(&envelope));
            match applied {
                Ok(_) => {}
                Err(ReadModelError::Sequence(_)) => self.catch_up(stored.aggregate_id)?,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Log a failed compensation step; the caller reports the original failure.
    fn compensate(&self, step: &'static str, outcome: ServiceResult<()>) {
        if let Err(err) = outcome {
            error!(step, error = %err, "compensation failed");
        }
    }

    fn catch_up(&self, aggregate_id: AggregateId) -> ServiceResult<()> {
        let stream = self
            .dispatcher
            .store()
            .load_stream(aggregate_id)
            .map_err(|e| ServiceError::internal("catch_up", e))?;
        for stored in &stream {
            let envelope = stored.to_envelope();
            self.directory.apply_envelope(&envelope)?;
            self.history.apply_envelope(&envelope)?;
        }
        Ok(())
    }
}
