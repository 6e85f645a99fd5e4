use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use ajo_core::{Aggregate, AggregateId, AggregateRoot, UserId};
use ajo_events::{EventEnvelope, Projection};
use ajo_groups::{Group, GroupEvent, GroupStatus};

use crate::event_store::StoredEvent;
use crate::projections::feed::{ReadModelError, StreamFeed};
use crate::read_model::KeyedStore;

/// Writes the latest state of every group into the store.
#[derive(Debug)]
pub struct GroupDirectory<S> {
    store: S,
}

impl<S> Projection for GroupDirectory<S>
where
    S: KeyedStore<AggregateId, Group>,
{
    type Ev = GroupEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        let id = envelope.aggregate_id();
        let mut group = self.store.get(&id).unwrap_or_else(|| Group::empty(id));
        group.apply(envelope.payload());
        self.store.upsert(id, group);
    }
}

/// Group directory: which groups a user belongs to, and which cycles are overdue.
#[derive(Debug)]
pub struct GroupDirectoryProjection<S>
where
    S: KeyedStore<AggregateId, Group> + Clone,
{
    store: S,
    feed: StreamFeed<GroupDirectory<S>>,
}

impl<S> GroupDirectoryProjection<S>
where
    S: KeyedStore<AggregateId, Group> + Clone,
{
    pub fn new(store: S) -> Self {
        let feed = StreamFeed::new(ajo_groups::AGGREGATE_TYPE, GroupDirectory { store: store.clone() });
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

    /// Drop the read model and replay the full event history.
    pub fn rebuild_from_scratch(&self, history: &[StoredEvent]) -> Result<(), ReadModelError> {
        self.store.clear();
        self.feed.rebuild(GroupDirectory { store: self.store.clone() }, history)
    }

    pub fn cursor(&self, group_id: AggregateId) -> u64 {
        self.feed.cursor(group_id)
    }

    pub fn get(&self, group_id: AggregateId) -> Option<Group> {
        self.store.get(&group_id)
    }

    pub fn all(&self) -> Vec<Group> {
        self.store.list()
    }

    /// Groups the user is a member of, newest first.
    pub fn groups_for(&self, user_id: UserId) -> Vec<Group> {
        let mut groups: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|g| g.is_member(user_id))
            .collect();
        groups.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(a.id())));
        groups
    }

    /// Active groups whose contribution deadline has passed.
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<AggregateId> {
        let mut ids: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|g| g.status() == GroupStatus::Active && g.is_cycle_due(now))
            .map(|g| *g.id())
            .collect();
        ids.sort();
        ids
    }
}
