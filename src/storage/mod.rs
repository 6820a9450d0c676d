//! MK2 Storage
//!
//! This module provides the realtime database the dashboard reads from:
//!
//! - **types**: Core data structures (Reading, UserPaths, LogQuery)
//! - **database**: Ordered readings logs, scalar values, subscriptions
//! - **refs**: Path-bound handles handed to dashboard components
//! - **wal**: Write-ahead journal for durability
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Reading → Journal (WAL) → Ordered log → Subscribers
//!
//! Read Path:
//!   LogQuery (end_at, limit_to_last) → Ordered log → Ascending readings
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use mk2_monitor::storage::{DatabaseConfig, LogQuery, RealtimeDatabase, Reading};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = RealtimeDatabase::open(DatabaseConfig::persistent("./data"))?;
//!
//!     db.push("UsersData/abc/readings", Reading::new(1641317355, 120.5, 30.2, 22.1))?;
//!
//!     let latest = db.get("UsersData/abc/readings", &LogQuery::all().limit_to_last(1))?;
//!     println!("{:?}", latest);
//!
//!     db.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod refs;
pub mod types;
pub mod wal;

pub use database::{ChildAdded, DatabaseConfig, DatabaseStats, RealtimeDatabase, SubscriptionId};
pub use error::{StorageError, StorageResult};
pub use refs::{RangeRef, ReadingsRef};
pub use types::{LogQuery, Reading, UserPaths};
pub use wal::{JournalEntry, WalSyncMode, WriteAheadLog};
