//! Write-Ahead Log (WAL) for the realtime database
//!
//! Every mutation of the database (reading pushed, path removed, scalar
//! value set) is journaled before it becomes visible to listeners. On open,
//! the journal is replayed to rebuild the in-memory state.
//!
//! Format per entry:
//! - length: u32 (4 bytes)
//! - data: [u8; length] (bincode-serialized `JournalEntry`)
//! - crc: u32 (4 bytes, CRC32 of length + data)

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::Reading;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Largest entry accepted during recovery
const MAX_ENTRY_LEN: usize = 1_000_000;

/// Sync strategy for WAL writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalSyncMode {
    /// Fsync after every write (safest, slowest)
    EveryWrite,
    /// Fsync in batches (balanced)
    #[default]
    Batched,
    /// No fsync, rely on OS (fastest, risk of loss)
    None,
}

impl FromStr for WalSyncMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "every_write" => Ok(WalSyncMode::EveryWrite),
            "batched" => Ok(WalSyncMode::Batched),
            "none" => Ok(WalSyncMode::None),
            other => Err(StorageError::WalError(format!("Unknown sync mode: {}", other))),
        }
    }
}

/// One journaled database mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntry {
    /// A reading was written to a readings log
    Push { path: String, reading: Reading },
    /// A path and everything below it was deleted
    Remove { path: String },
    /// A scalar value was written
    SetValue { path: String, value: u32 },
}

/// Write-Ahead Log for durability
pub struct WriteAheadLog {
    writer: BufWriter<File>,
    path: PathBuf,
    entry_count: u64,
    bytes_since_sync: usize,
    sync_mode: WalSyncMode,
    /// Batch sync threshold (bytes)
    sync_threshold: usize,
}

impl WriteAheadLog {
    /// Open or create a WAL file
    pub fn open(path: impl AsRef<Path>, sync_mode: WalSyncMode) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let entry_count = Self::count_entries(&path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            entry_count,
            bytes_since_sync: 0,
            sync_mode,
            sync_threshold: 64 * 1024,
        })
    }

    fn count_entries(path: &Path) -> StorageResult<u64> {
        if !path.exists() {
            return Ok(0);
        }

        let mut reader = BufReader::new(File::open(path)?);
        let mut count = 0u64;

        loop {
            match Self::read_entry_from(&mut reader) {
                Ok(Some(_)) => count += 1,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("WAL corruption at entry {}: {}", count, e);
                    break;
                }
            }
        }

        Ok(count)
    }

    /// Append one entry to the WAL
    pub fn append(&mut self, entry: &JournalEntry) -> StorageResult<()> {
        self.write_entry(entry)?;
        self.maybe_sync()
    }

    /// Append multiple entries, syncing once at the end
    pub fn append_batch(&mut self, entries: &[JournalEntry]) -> StorageResult<()> {
        for entry in entries {
            self.write_entry(entry)?;
        }
        self.maybe_sync()
    }

    fn write_entry(&mut self, entry: &JournalEntry) -> StorageResult<()> {
        let written = Self::encode_into(&mut self.writer, entry)?;
        self.entry_count += 1;
        self.bytes_since_sync += written;
        Ok(())
    }

    /// Frame one entry into `writer`, returning the bytes written
    fn encode_into<W: Write>(writer: &mut W, entry: &JournalEntry) -> StorageResult<usize> {
        let data = bincode::serialize(entry)?;
        let len = (data.len() as u32).to_le_bytes();

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len);
        hasher.update(&data);
        let crc = hasher.finalize();

        writer.write_all(&len)?;
        writer.write_all(&data)?;
        writer.write_all(&crc.to_le_bytes())?;
        Ok(8 + data.len())
    }

    fn maybe_sync(&mut self) -> StorageResult<()> {
        match self.sync_mode {
            WalSyncMode::EveryWrite => self.sync()?,
            WalSyncMode::Batched => {
                if self.bytes_since_sync >= self.sync_threshold {
                    self.sync()?;
                } else {
                    self.writer.flush()?;
                }
            }
            WalSyncMode::None => self.writer.flush()?,
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.bytes_since_sync = 0;
        Ok(())
    }

    /// Read all valid entries, stopping at the first corrupt one
    pub fn recover(&self) -> StorageResult<Vec<JournalEntry>> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();

        loop {
            match Self::read_entry_from(&mut reader) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("WAL recovery stopped at entry {}: {}", entries.len(), e);
                    break;
                }
            }
        }

        Ok(entries)
    }

    fn read_entry_from<R: Read>(reader: &mut R) -> StorageResult<Option<JournalEntry>> {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_ENTRY_LEN {
            return Err(StorageError::WalError(format!(
                "Entry length too large: {}",
                len
            )));
        }

        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;

        let mut crc_buf = [0u8; 4];
        reader.read_exact(&mut crc_buf)?;
        let stored_crc = u32::from_le_bytes(crc_buf);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len_buf);
        hasher.update(&data);
        let computed_crc = hasher.finalize();

        if stored_crc != computed_crc {
            return Err(StorageError::Corruption(format!(
                "CRC mismatch: stored={}, computed={}",
                stored_crc, computed_crc
            )));
        }

        Ok(Some(bincode::deserialize(&data)?))
    }

    /// Replace the journal contents with `entries` (compaction)
    ///
    /// The snapshot is written to a sibling temp file and renamed over the
    /// journal, so the old journal stays intact until the new one is durable.
    pub fn rewrite(&mut self, entries: &[JournalEntry]) -> StorageResult<()> {
        self.writer.flush()?;

        let tmp_path = self.temp_path();
        let written = Self::write_snapshot(&tmp_path, entries);
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        std::fs::rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            // Persist the rename itself; not every platform allows opening a directory
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        self.writer = BufWriter::new(OpenOptions::new().append(true).open(&self.path)?);
        self.entry_count = entries.len() as u64;
        self.bytes_since_sync = 0;
        tracing::debug!(entries = entries.len(), bytes, "Journal rewritten");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn write_snapshot(path: &Path, entries: &[JournalEntry]) -> StorageResult<usize> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        let mut bytes = 0;

        for entry in entries {
            bytes += Self::encode_into(&mut writer, entry)?;
        }

        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(bytes)
    }

    /// Number of entries in the WAL
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn file_size(&self) -> StorageResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}
