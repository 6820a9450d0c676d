//! History Table Paginator
//!
//! The history table lists readings newest first. It opens with the most
//! recent page and grows downwards with "load more":
//!
//! - **initial page**: readings arrive oldest first and each one is prepended,
//!   so the finished table is newest first. The first reading received is the
//!   oldest on screen and becomes the cursor.
//! - **load more**: fetch up to a page of readings ending at the cursor
//!   (inclusive), reverse them, drop the first row (it is the boundary row
//!   already on screen) and append the rest. The oldest fetched reading
//!   becomes the new cursor.
//!
//! An empty page leaves the cursor where it was. Callers treat repeated empty
//! pages as "no more data".

use serde::Serialize;
use std::sync::{Arc, Mutex};

use super::feed::{FeedSubscription, LiveFeed};
use super::summary::display_value;
use super::time_format::to_date_time;
use super::UiSink;
use crate::storage::{LogQuery, Reading, ReadingsRef, StorageResult};
use crate::websocket::ServerMessage;

/// Readings fetched per page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A "load more" page repeats the boundary row, so it needs room for one more
pub const MIN_PAGE_SIZE: usize = 2;

/// One rendered table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub timestamp: i64,
    pub date_time: String,
    pub power: String,
    pub diverted: String,
    pub load: String,
}

impl TableRow {
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            date_time: to_date_time(reading.timestamp),
            power: display_value(reading.power),
            diverted: display_value(reading.diverted),
            load: display_value(reading.load),
        }
    }
}

/// Cursor state of one history table
#[derive(Debug, Clone)]
pub struct HistoryPaginator {
    page_size: usize,
    cursor: Option<i64>,
}

impl HistoryPaginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(MIN_PAGE_SIZE),
            cursor: None,
        }
    }

    /// Timestamp of the oldest reading on screen
    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn reset(&mut self) {
        self.cursor = None;
    }

    /// Fetch and render the most recent page, newest first
    pub fn load_initial(&mut self, readings: &ReadingsRef) -> StorageResult<Vec<TableRow>> {
        self.reset();
        let batch = readings.get(&LogQuery::all().limit_to_last(self.page_size))?;
        Ok(self.render_initial(&batch))
    }

    /// Render readings in arrival order (ascending) by prepending each one
    pub fn render_initial(&mut self, batch: &[Reading]) -> Vec<TableRow> {
        let mut rows = Vec::with_capacity(batch.len());
        for reading in batch {
            self.note_arrival(reading);
            rows.insert(0, TableRow::from_reading(reading));
        }
        rows
    }

    /// Record a reading as it reaches the table; the first one sets the cursor
    pub fn note_arrival(&mut self, reading: &Reading) {
        if self.cursor.is_none() {
            self.cursor = Some(reading.timestamp);
        }
    }

    /// Fetch the page ending at the cursor and return the rows to append
    pub fn load_more(&mut self, readings: &ReadingsRef) -> StorageResult<Vec<TableRow>> {
        let Some(cursor) = self.cursor else {
            return Ok(Vec::new());
        };

        let page = readings.get(&LogQuery::all().end_at(cursor).limit_to_last(self.page_size))?;
        let Some(oldest) = page.first() else {
            return Ok(Vec::new());
        };
        self.cursor = Some(oldest.timestamp);

        Ok(page
            .iter()
            .rev()
            .skip(1)
            .map(TableRow::from_reading)
            .collect())
    }
}

/// The history table of one dashboard session.
///
/// Besides paging, the table follows the readings log: readings written
/// after it opened are prepended live.
pub struct HistoryTable {
    readings: ReadingsRef,
    paginator: Arc<Mutex<HistoryPaginator>>,
    follow: Option<FeedSubscription>,
    visible: bool,
    ui: UiSink,
}

impl HistoryTable {
    pub fn new(readings: ReadingsRef, page_size: usize, ui: &UiSink) -> Self {
        Self {
            readings,
            paginator: Arc::new(Mutex::new(HistoryPaginator::new(page_size))),
            follow: None,
            visible: false,
            ui: ui.clone(),
        }
    }

    /// Show the table with the most recent page and start following new readings.
    ///
    /// Reopening replaces the previous rows and follow subscription.
    pub fn open(&mut self) -> StorageResult<Vec<TableRow>> {
        if let Some(follow) = self.follow.take() {
            follow.stop();
        }

        let page_size = {
            let mut paginator = self.paginator.lock()?;
            paginator.reset();
            paginator.page_size()
        };

        let mut subscription = self.readings.subscribe(page_size)?;
        let initial = std::mem::take(&mut subscription.initial);
        let rows = self.paginator.lock()?.render_initial(&initial);

        let paginator = Arc::clone(&self.paginator);
        let ui = self.ui.clone();
        self.follow = Some(LiveFeed::attach(&self.readings, subscription, move |reading| {
            if let Ok(mut paginator) = paginator.lock() {
                paginator.note_arrival(reading);
            }
            let _ = ui.send(ServerMessage::RowPrepended {
                row: TableRow::from_reading(reading),
            });
        }));

        self.visible = true;
        tracing::debug!(path = %self.readings.path(), rows = rows.len(), "History table opened");
        let _ = self.ui.send(ServerMessage::TableLoaded { rows: rows.clone() });
        Ok(rows)
    }

    /// Append the next older page
    pub fn load_more(&mut self) -> StorageResult<Vec<TableRow>> {
        let rows = self.paginator.lock()?.load_more(&self.readings)?;
        let _ = self.ui.send(ServerMessage::RowsAppended { rows: rows.clone() });
        Ok(rows)
    }

    /// Hide the table. Rows, cursor and follow subscription are kept.
    pub fn hide(&mut self) {
        self.visible = false;
        let _ = self.ui.send(ServerMessage::TableHidden);
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn cursor(&self) -> Option<i64> {
        self.paginator.lock().ok().and_then(|p| p.cursor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RealtimeDatabase;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn seeded(count: i64) -> ReadingsRef {
        let readings = ReadingsRef::new(Arc::new(RealtimeDatabase::in_memory()), "UsersData/u1/readings");
        for ts in 1..=count {
            readings.push(Reading::new(ts, ts as f64, 0.5, 2.0)).unwrap();
        }
        readings
    }

    fn stamps(rows: &[TableRow]) -> Vec<i64> {
        rows.iter().map(|r| r.timestamp).collect()
    }

    #[test]
    fn test_initial_page_is_newest_first_with_oldest_cursor() {
        let readings = seeded(250);
        let mut paginator = HistoryPaginator::new(100);

        let rows = paginator.load_initial(&readings).unwrap();
        assert_eq!(rows.len(), 100);
        assert_eq!(rows.first().unwrap().timestamp, 250);
        assert_eq!(rows.last().unwrap().timestamp, 151);
        assert_eq!(paginator.cursor(), Some(151));
    }

    #[test]
    fn test_smallest_page_size_still_pages_through_history() {
        let readings = seeded(5);
        let mut paginator = HistoryPaginator::new(1);
        assert_eq!(paginator.page_size(), MIN_PAGE_SIZE);

        assert_eq!(stamps(&paginator.load_initial(&readings).unwrap()), vec![5, 4]);
        assert_eq!(paginator.cursor(), Some(4));

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.extend(stamps(&paginator.load_more(&readings).unwrap()));
        }
        assert_eq!(seen, vec![3, 2, 1]);
        assert_eq!(paginator.cursor(), Some(1));
    }

    #[test]
    fn test_load_more_skips_boundary_row() {
        let readings = seeded(250);
        let mut paginator = HistoryPaginator::new(100);
        paginator.load_initial(&readings).unwrap();

        let more = paginator.load_more(&readings).unwrap();
        assert_eq!(more.len(), 99);
        assert_eq!(more.first().unwrap().timestamp, 150);
        assert_eq!(more.last().unwrap().timestamp, 52);
        assert_eq!(paginator.cursor(), Some(52));
    }

    #[test]
    fn test_consecutive_load_more_never_duplicates() {
        let readings = seeded(250);
        let mut paginator = HistoryPaginator::new(100);
        let mut table = paginator.load_initial(&readings).unwrap();

        loop {
            let more = paginator.load_more(&readings).unwrap();
            if more.is_empty() {
                break;
            }
            table.extend(more);
        }

        let shown = stamps(&table);
        let expected: Vec<i64> = (1..=250).rev().collect();
        assert_eq!(shown, expected);
        assert_eq!(paginator.cursor(), Some(1));

        // Exhausted: still empty, cursor unchanged
        assert!(paginator.load_more(&readings).unwrap().is_empty());
        assert_eq!(paginator.cursor(), Some(1));
    }

    #[test]
    fn test_load_more_on_empty_page_keeps_cursor() {
        let readings = seeded(5);
        let mut paginator = HistoryPaginator::new(100);
        paginator.load_initial(&readings).unwrap();
        assert_eq!(paginator.cursor(), Some(1));

        readings.remove().unwrap();
        assert!(paginator.load_more(&readings).unwrap().is_empty());
        assert_eq!(paginator.cursor(), Some(1));
    }

    #[test]
    fn test_load_more_without_cursor_is_noop() {
        let readings = seeded(5);
        let mut paginator = HistoryPaginator::new(100);
        assert!(paginator.load_more(&readings).unwrap().is_empty());
        assert_eq!(paginator.cursor(), None);
    }

    #[test]
    fn test_row_from_partial_reading() {
        let reading = Reading {
            timestamp: 1641317355,
            power: Some(120.5),
            diverted: Some(30.2),
            load: None,
        };
        let row = TableRow::from_reading(&reading);
        assert_eq!(row.timestamp, 1641317355);
        assert_eq!(row.date_time.len(), "2022/01/04 17:29:15".len());
        assert_eq!(row.power, "120.5");
        assert_eq!(row.diverted, "30.2");
        assert_eq!(row.load, "");
    }

    #[tokio::test]
    async fn test_table_follows_new_readings() {
        let readings = seeded(3);
        let (ui, mut rx) = mpsc::unbounded_channel();
        let mut table = HistoryTable::new(readings.clone(), 100, &ui);

        let rows = table.open().unwrap();
        assert_eq!(stamps(&rows), vec![3, 2, 1]);
        assert!(table.is_visible());
        assert!(matches!(rx.recv().await, Some(ServerMessage::TableLoaded { .. })));

        readings.push(Reading::new(4, 1.0, 1.0, 1.0)).unwrap();
        let prepended = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match prepended {
            ServerMessage::RowPrepended { row } => assert_eq!(row.timestamp, 4),
            other => panic!("Expected RowPrepended, got {:?}", other),
        }
        assert_eq!(table.cursor(), Some(1));
    }

    #[tokio::test]
    async fn test_reopen_replaces_follow_subscription() {
        let readings = seeded(3);
        let (ui, _rx) = mpsc::unbounded_channel();
        let mut table = HistoryTable::new(readings.clone(), 100, &ui);

        table.open().unwrap();
        table.hide();
        assert!(!table.is_visible());
        table.open().unwrap();

        assert_eq!(readings.subscriber_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_table_takes_cursor_from_first_live_reading() {
        let readings = seeded(0);
        let (ui, _rx) = mpsc::unbounded_channel();
        let mut table = HistoryTable::new(readings.clone(), 100, &ui);

        assert!(table.open().unwrap().is_empty());
        assert_eq!(table.cursor(), None);

        readings.push(Reading::new(42, 1.0, 1.0, 1.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(table.cursor(), Some(42));
    }
}
