//! Realtime Database
//!
//! In-process stand-in for the hosted realtime database the dashboard was
//! built against. It stores:
//!
//! - **Readings logs**: per-path ordered logs keyed by reading timestamp,
//!   queryable by "last N" and "ending at" bounds.
//! - **Scalar values**: small integers (the chart range) with watchers that
//!   see the current value immediately and every later change.
//!
//! Subscriptions replay the matching tail of a log and then stream every
//! reading written afterwards. Snapshot and registration happen under one
//! lock, so nothing is lost or delivered twice between replay and stream.
//!
//! Mutations are journaled to a write-ahead log before they become visible
//! when a data directory is configured.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{LogQuery, Reading};
use crate::storage::wal::{JournalEntry, WalSyncMode, WriteAheadLog};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};

/// Identifier of one readings subscription
pub type SubscriptionId = u64;

/// Configuration for the realtime database
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Root directory for the journal; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// WAL sync strategy
    pub wal_sync: WalSyncMode,
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Default::default()
        }
    }

    /// Get path to the journal file
    pub fn journal_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join("journal").join("current.wal"))
    }
}

/// Replayed tail plus live stream of one readings subscription
pub struct ChildAdded {
    pub id: SubscriptionId,
    pub path: String,
    /// Readings that matched at subscription time, ascending
    pub initial: Vec<Reading>,
    /// Readings written after subscription time, in write order
    pub receiver: mpsc::UnboundedReceiver<Reading>,
}

#[derive(Default)]
struct ReadingLog {
    entries: BTreeMap<i64, Reading>,
    listeners: HashMap<SubscriptionId, mpsc::UnboundedSender<Reading>>,
}

impl ReadingLog {
    fn query(&self, query: &LogQuery) -> Vec<Reading> {
        let matching: Box<dyn DoubleEndedIterator<Item = &Reading> + '_> = match query.end_at {
            Some(end) => Box::new(self.entries.range(..=end).map(|(_, r)| r)),
            None => Box::new(self.entries.values()),
        };

        match query.limit_to_last {
            Some(n) => {
                let mut tail: Vec<Reading> = matching.rev().take(n).cloned().collect();
                tail.reverse();
                tail
            }
            None => matching.cloned().collect(),
        }
    }
}

#[derive(Default)]
struct DatabaseState {
    logs: HashMap<String, ReadingLog>,
    values: HashMap<String, watch::Sender<Option<u32>>>,
    next_subscription: SubscriptionId,
}

impl DatabaseState {
    fn apply(&mut self, entry: JournalEntry) -> usize {
        match entry {
            JournalEntry::Push { path, reading } => {
                let log = self.logs.entry(path).or_default();
                log.entries.insert(reading.timestamp, reading.clone());
                // Closed receivers are pruned on delivery
                log.listeners.retain(|_, tx| tx.send(reading.clone()).is_ok());
                0
            }
            JournalEntry::Remove { path } => {
                let mut removed = 0;
                for (log_path, log) in self.logs.iter_mut() {
                    if is_within(log_path, &path) {
                        removed += log.entries.len();
                        log.entries.clear();
                    }
                }
                for (value_path, tx) in self.values.iter() {
                    if is_within(value_path, &path) {
                        tx.send_replace(None);
                    }
                }
                removed
            }
            JournalEntry::SetValue { path, value } => {
                self.value_sender(&path).send_replace(Some(value));
                0
            }
        }
    }

    fn value_sender(&mut self, path: &str) -> &watch::Sender<Option<u32>> {
        self.values
            .entry(path.to_string())
            .or_insert_with(|| watch::channel(None).0)
    }

    /// Journal entries that recreate the current state
    fn snapshot(&self) -> Vec<JournalEntry> {
        let mut entries = Vec::new();
        for (path, log) in &self.logs {
            for reading in log.entries.values() {
                entries.push(JournalEntry::Push {
                    path: path.clone(),
                    reading: reading.clone(),
                });
            }
        }
        for (path, tx) in &self.values {
            if let Some(value) = *tx.borrow() {
                entries.push(JournalEntry::SetValue {
                    path: path.clone(),
                    value,
                });
            }
        }
        entries
    }
}

/// `candidate` is `root` itself or lies below it
fn is_within(candidate: &str, root: &str) -> bool {
    candidate == root
        || (candidate.starts_with(root) && candidate[root.len()..].starts_with('/'))
}

fn validate_path(path: &str) -> StorageResult<()> {
    if path.is_empty() || path.split('/').any(|segment| segment.is_empty()) {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Summary statistics about the database
#[derive(Debug, Clone, Default)]
pub struct DatabaseStats {
    pub logs: usize,
    pub readings: usize,
    pub values: usize,
    pub subscriptions: usize,
    pub journal_entries: u64,
}

impl std::fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "logs={}, readings={}, values={}, subscriptions={}, journal_entries={}",
            self.logs, self.readings, self.values, self.subscriptions, self.journal_entries
        )
    }
}

/// The realtime database shared by every dashboard session and API handler
pub struct RealtimeDatabase {
    state: RwLock<DatabaseState>,
    journal: Option<Mutex<WriteAheadLog>>,
}

impl RealtimeDatabase {
    /// Create an empty database that keeps nothing on disk
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(DatabaseState::default()),
            journal: None,
        }
    }

    /// Open a database, replaying the journal if one is configured
    pub fn open(config: DatabaseConfig) -> StorageResult<Self> {
        let Some(journal_path) = config.journal_path() else {
            return Ok(Self::in_memory());
        };

        let mut wal = WriteAheadLog::open(&journal_path, config.wal_sync)?;
        let entries = wal.recover()?;
        let replayed = entries.len();

        let mut state = DatabaseState::default();
        for entry in entries {
            state.apply(entry);
        }

        // Drop removed history from the journal
        wal.rewrite(&state.snapshot())?;

        tracing::info!(
            journal = %journal_path.display(),
            replayed,
            compacted_to = wal.entry_count(),
            "Realtime database opened"
        );

        Ok(Self {
            state: RwLock::new(state),
            journal: Some(Mutex::new(wal)),
        })
    }

    fn commit(&self, state: &mut DatabaseState, entry: JournalEntry) -> StorageResult<usize> {
        if let Some(journal) = &self.journal {
            journal.lock()?.append(&entry)?;
        }
        Ok(state.apply(entry))
    }

    /// Write a reading to the log at `path`, replacing one with the same timestamp
    pub fn push(&self, path: &str, reading: Reading) -> StorageResult<()> {
        validate_path(path)?;
        let mut state = self.state.write()?;
        tracing::trace!(path, timestamp = reading.timestamp, "Reading pushed");
        self.commit(
            &mut state,
            JournalEntry::Push {
                path: path.to_string(),
                reading,
            },
        )?;
        Ok(())
    }

    /// One-shot ordered read
    pub fn get(&self, path: &str, query: &LogQuery) -> StorageResult<Vec<Reading>> {
        let state = self.state.read()?;
        Ok(state
            .logs
            .get(path)
            .map(|log| log.query(query))
            .unwrap_or_default())
    }

    /// Newest reading at `path`, if any
    pub fn last(&self, path: &str) -> StorageResult<Option<Reading>> {
        Ok(self.get(path, &LogQuery::all().limit_to_last(1))?.pop())
    }

    /// Subscribe to the last `limit` readings and every reading written later
    pub fn subscribe(&self, path: &str, limit: usize) -> StorageResult<ChildAdded> {
        validate_path(path)?;
        let mut state = self.state.write()?;

        let id = state.next_subscription;
        state.next_subscription += 1;

        let (tx, receiver) = mpsc::unbounded_channel();
        let log = state.logs.entry(path.to_string()).or_default();
        let initial = log.query(&LogQuery::all().limit_to_last(limit));
        log.listeners.insert(id, tx);

        tracing::debug!(path, subscription = id, limit, "Subscription registered");

        Ok(ChildAdded {
            id,
            path: path.to_string(),
            initial,
            receiver,
        })
    }

    /// Cancel a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, path: &str, id: SubscriptionId) -> StorageResult<bool> {
        let mut state = self.state.write()?;
        let removed = state
            .logs
            .get_mut(path)
            .map(|log| log.listeners.remove(&id).is_some())
            .unwrap_or(false);

        if removed {
            tracing::debug!(path, subscription = id, "Subscription cancelled");
        }
        Ok(removed)
    }

    /// Number of live subscriptions on `path`
    pub fn subscriber_count(&self, path: &str) -> StorageResult<usize> {
        let state = self.state.read()?;
        Ok(state
            .logs
            .get(path)
            .map(|log| log.listeners.values().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0))
    }

    /// Delete `path` and everything below it. Returns the number of readings removed.
    ///
    /// Subscriptions on removed logs stay registered and receive later writes.
    pub fn remove(&self, path: &str) -> StorageResult<usize> {
        validate_path(path)?;
        let mut state = self.state.write()?;
        let removed = self.commit(
            &mut state,
            JournalEntry::Remove {
                path: path.to_string(),
            },
        )?;
        tracing::info!(path, removed, "Path removed");
        Ok(removed)
    }

    /// Write a scalar value and notify its watchers
    pub fn set_value(&self, path: &str, value: u32) -> StorageResult<()> {
        validate_path(path)?;
        let mut state = self.state.write()?;
        self.commit(
            &mut state,
            JournalEntry::SetValue {
                path: path.to_string(),
                value,
            },
        )?;
        Ok(())
    }

    /// Current scalar value at `path`
    pub fn get_value(&self, path: &str) -> StorageResult<Option<u32>> {
        let state = self.state.read()?;
        Ok(state.values.get(path).and_then(|tx| *tx.borrow()))
    }

    /// Watch a scalar value; the receiver starts at the current value
    pub fn watch_value(&self, path: &str) -> StorageResult<watch::Receiver<Option<u32>>> {
        validate_path(path)?;
        let mut state = self.state.write()?;
        Ok(state.value_sender(path).subscribe())
    }

    /// Rewrite the journal so it only holds the current state
    pub fn compact(&self) -> StorageResult<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let state = self.state.read()?;
        let snapshot = state.snapshot();
        journal.lock()?.rewrite(&snapshot)?;
        tracing::debug!(entries = snapshot.len(), "Journal compacted");
        Ok(())
    }

    /// Force pending journal writes to disk
    pub fn flush(&self) -> StorageResult<()> {
        if let Some(journal) = &self.journal {
            journal.lock()?.sync()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> StorageResult<DatabaseStats> {
        let state = self.state.read()?;
        let journal_entries = match &self.journal {
            Some(journal) => journal.lock()?.entry_count(),
            None => 0,
        };

        Ok(DatabaseStats {
            logs: state.logs.len(),
            readings: state.logs.values().map(|log| log.entries.len()).sum(),
            values: state.values.values().filter(|tx| tx.borrow().is_some()).count(),
            subscriptions: state.logs.values().map(|log| log.listeners.len()).sum(),
            journal_entries,
        })
    }

    /// Compact and sync the journal before exit
    pub fn shutdown(&self) -> StorageResult<()> {
        self.compact()?;
        self.flush()
    }
}
