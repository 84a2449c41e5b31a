//! In-memory record store
//!
//! Each family lives in one `IndexMap` behind one read-write lock. The map is
//! both the lookup index and the listing order, so the two can never disagree.
//! Every mutation finishes under a single write guard and readers clone what
//! they need under a read guard, so nobody observes a half-applied change.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;

use crate::client::models::{ChangeEvent, Domain, Record, RecordPatch, Url};

/// Result of an incremental mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The key was not present; nothing changed
    Missing,
}

/// Records of a single family, keyed by their identifying key
pub struct RecordStore<R: Record> {
    records: RwLock<IndexMap<String, R>>,
}

impl<R: Record> Default for RecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> RecordStore<R> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(IndexMap::new()),
        }
    }

    // Mutations never leave the map half-updated, so a poisoned lock still
    // guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, R>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, R>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discard every record and install `records`, keeping their order.
    ///
    /// The new index is built before the lock is taken. Returns the number of
    /// distinct keys installed.
    pub fn replace_all(&self, records: Vec<R>) -> usize {
        let index: IndexMap<String, R> = records
            .into_iter()
            .map(|record| (record.key().to_string(), record))
            .collect();
        let count = index.len();

        *self.write() = index;
        count
    }

    /// Insert a record, replacing any record with the same key in place.
    pub fn apply_create(&self, record: R) -> ApplyOutcome {
        self.write().insert(record.key().to_string(), record);
        ApplyOutcome::Applied
    }

    /// Overwrite the fields `patch` supplies on an existing record.
    pub fn apply_update(&self, key: &str, patch: RecordPatch, now: i64) -> ApplyOutcome {
        match self.write().get_mut(key) {
            Some(record) => {
                record.fields_mut().apply(patch, now);
                ApplyOutcome::Applied
            }
            None => ApplyOutcome::Missing,
        }
    }

    pub fn apply_delete(&self, key: &str) -> ApplyOutcome {
        match self.write().shift_remove(key) {
            Some(_) => ApplyOutcome::Applied,
            None => ApplyOutcome::Missing,
        }
    }

    pub fn get(&self, key: &str) -> Option<R> {
        self.read().get(key).cloned()
    }

    /// Snapshot of every record in listing order
    pub fn list(&self) -> Vec<R> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Both record families
#[derive(Default)]
pub struct RecordCache {
    pub domains: RecordStore<Domain>,
    pub urls: RecordStore<Url>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one change event to the family it targets.
    ///
    /// Creates stamp both timestamps with `now`; updates refresh `checked`.
    pub fn apply(&self, event: ChangeEvent, now: i64) -> ApplyOutcome {
        match event {
            ChangeEvent::DomainCreate(created) => self.domains.apply_create(Domain::new(
                created.domain,
                created.draft.into_fields(now),
            )),
            ChangeEvent::DomainUpdate(updated) => {
                self.domains
                    .apply_update(&updated.domain, updated.patch, now)
            }
            ChangeEvent::DomainDelete(deleted) => self.domains.apply_delete(&deleted.domain),
            ChangeEvent::UrlCreate(created) => self
                .urls
                .apply_create(Url::new(created.url, created.draft.into_fields(now))),
            ChangeEvent::UrlUpdate(updated) => self.urls.apply_update(&updated.url, updated.patch, now),
            ChangeEvent::UrlDelete(deleted) => self.urls.apply_delete(&deleted.url),
        }
    }
}
