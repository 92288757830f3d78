//! Duck-typed reconciliation adapter over the event store (spec §4.8, §9
//! "Duck-typed reconciliation store"). `negentropy` expects a small
//! capability set; this is the narrow interface that exposes exactly it
//! and nothing else of the event store.

use warden_store::{EventStore, PutOutcome, StoreFilter, StoredEvent};

use crate::error::{ReconcileError, Result};

pub struct StoreAdapter<'a> {
    store: &'a EventStore,
}

impl<'a> StoreAdapter<'a> {
    pub fn new(store: &'a EventStore) -> Self {
        Self { store }
    }

    /// Local events matching `filter`, used to seed the negentropy range set.
    pub async fn query(&self, filter: StoreFilter) -> Result<Vec<StoredEvent>> {
        Ok(self.store.query(filter).await?)
    }

    pub async fn save(&self, event: StoredEvent) -> Result<PutOutcome> {
        Ok(self.store.put_event(event).await?)
    }

    /// Semantically equal to `save`: the store's own supersede rule handles
    /// replaceable kinds atomically.
    pub async fn replace(&self, event: StoredEvent) -> Result<PutOutcome> {
        self.save(event).await
    }

    /// Not used in the pull direction; the source never needs it and the
    /// adapter deliberately mutates nothing rather than approximate it.
    pub async fn delete(&self, _id: &str) -> Result<()> {
        Err(ReconcileError::Protocol("delete is not implemented in the pull direction".into()))
    }
}
