//! Path-bound database handles
//!
//! Dashboard components never see raw paths: they receive a `ReadingsRef`
//! (the user's readings log) or a `RangeRef` (the user's stored chart range).

use crate::storage::database::{ChildAdded, RealtimeDatabase, SubscriptionId};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{LogQuery, Reading, UserPaths};
use std::sync::Arc;
use tokio::sync::watch;

/// Handle to one readings log
#[derive(Clone)]
pub struct ReadingsRef {
    db: Arc<RealtimeDatabase>,
    path: String,
}

impl ReadingsRef {
    pub fn new(db: Arc<RealtimeDatabase>, path: impl Into<String>) -> Self {
        Self {
            db,
            path: path.into(),
        }
    }

    /// The readings log of a user
    pub fn for_user(db: Arc<RealtimeDatabase>, paths: &UserPaths) -> Self {
        Self::new(db, paths.readings())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn push(&self, reading: Reading) -> StorageResult<()> {
        self.db.push(&self.path, reading)
    }

    pub fn get(&self, query: &LogQuery) -> StorageResult<Vec<Reading>> {
        self.db.get(&self.path, query)
    }

    pub fn last(&self) -> StorageResult<Option<Reading>> {
        self.db.last(&self.path)
    }

    /// Replay the last `limit` readings and stream later ones
    pub fn subscribe(&self, limit: usize) -> StorageResult<ChildAdded> {
        self.db.subscribe(&self.path, limit)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> StorageResult<bool> {
        self.db.unsubscribe(&self.path, id)
    }

    pub fn subscriber_count(&self) -> StorageResult<usize> {
        self.db.subscriber_count(&self.path)
    }

    /// Delete every reading in the log. Irreversible.
    pub fn remove(&self) -> StorageResult<usize> {
        self.db.remove(&self.path)
    }
}

/// Handle to a user's stored chart range
#[derive(Clone)]
pub struct RangeRef {
    db: Arc<RealtimeDatabase>,
    path: String,
}

impl RangeRef {
    pub fn new(db: Arc<RealtimeDatabase>, path: impl Into<String>) -> Self {
        Self {
            db,
            path: path.into(),
        }
    }

    pub fn for_user(db: Arc<RealtimeDatabase>, paths: &UserPaths) -> Self {
        Self::new(db, paths.chart_range())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn get(&self) -> StorageResult<Option<u32>> {
        self.db.get_value(&self.path)
    }

    /// Store a new range. Watchers are notified; nothing is rebuilt here.
    pub fn set(&self, range: u32) -> StorageResult<()> {
        if range == 0 {
            return Err(StorageError::InvalidRange(range));
        }
        self.db.set_value(&self.path, range)
    }

    /// Watch the stored range, starting from its current value
    pub fn watch(&self) -> StorageResult<watch::Receiver<Option<u32>>> {
        self.db.watch_value(&self.path)
    }
}
