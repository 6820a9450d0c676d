//! Range Controller
//!
//! Watches the user's stored chart range. On the initial value and on every
//! change it rebuilds the charts from scratch:
//!
//! 1. stop the current charting feed
//! 2. destroy the three chart views
//! 3. create three fresh views
//! 4. start a new charting feed limited to the new range
//!
//! Charts cannot shrink or grow their window in place, so there is no
//! diffing between the old and new range.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::chart::ChartSet;
use super::feed::{FeedSubscription, LiveFeed};
use super::UiSink;
use crate::config::DashboardConfig;
use crate::storage::{RangeRef, ReadingsRef, StorageResult};
use crate::websocket::ServerMessage;

/// Charts plus the feed plotting into them
struct ChartingState {
    charts: Arc<Mutex<Option<ChartSet>>>,
    feed: Option<FeedSubscription>,
    readings: ReadingsRef,
    window: usize,
    ui: UiSink,
}

impl ChartingState {
    fn rebuild(&mut self, range: u32) -> StorageResult<()> {
        // Stop first so no in-flight reading lands in the new charts
        if let Some(feed) = self.feed.take() {
            feed.stop();
        }

        {
            let mut charts = self.charts.lock()?;
            if let Some(old) = charts.take() {
                old.destroy();
            }
            *charts = Some(ChartSet::create(self.window, &self.ui));
        }

        let charts = Arc::clone(&self.charts);
        self.feed = Some(LiveFeed::start(&self.readings, range as usize, move |reading| {
            if let Ok(mut guard) = charts.lock() {
                if let Some(set) = guard.as_mut() {
                    set.plot(reading);
                }
            }
        })?);

        let _ = self.ui.send(ServerMessage::RangeChanged { range });
        Ok(())
    }
}

/// Keeps the dashboard charts in step with the stored chart range
pub struct RangeController {
    range: RangeRef,
    state: Arc<Mutex<ChartingState>>,
    applied: watch::Receiver<Option<u32>>,
    task: JoinHandle<()>,
}

impl RangeController {
    /// Create the charts and start watching the stored range.
    ///
    /// While no range is stored, `settings.default_chart_range` is used.
    pub fn watch(
        range: RangeRef,
        readings: ReadingsRef,
        settings: &DashboardConfig,
        ui: &UiSink,
    ) -> StorageResult<Self> {
        let mut stored = range.watch()?;
        let (applied_tx, applied) = watch::channel(None);

        let state = Arc::new(Mutex::new(ChartingState {
            charts: Arc::new(Mutex::new(Some(ChartSet::create(settings.chart_window, ui)))),
            feed: None,
            readings,
            window: settings.chart_window,
            ui: ui.clone(),
        }));

        let task_state = Arc::clone(&state);
        let default_range = settings.default_chart_range;
        let path = range.path().to_string();

        let task = tokio::spawn(async move {
            loop {
                let value = stored.borrow_and_update().unwrap_or(default_range);
                tracing::info!(path = %path, range = value, "Rebuilding charts");

                let result = match task_state.lock() {
                    Ok(mut charting) => charting.rebuild(value),
                    Err(e) => Err(e.into()),
                };
                match result {
                    Ok(()) => {
                        applied_tx.send_replace(Some(value));
                    }
                    Err(e) => {
                        tracing::warn!(path = %path, range = value, error = %e, "Chart rebuild failed");
                    }
                }

                if stored.changed().await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            range,
            state,
            applied,
            task,
        })
    }

    /// Store a new range; the watcher performs the rebuild
    pub fn set_range(&self, value: u32) -> StorageResult<()> {
        self.range.set(value)
    }

    /// Range the charts were last rebuilt with
    pub fn applied(&self) -> watch::Receiver<Option<u32>> {
        self.applied.clone()
    }
}

impl Drop for RangeController {
    fn drop(&mut self) {
        self.task.abort();
        let feed = match self.state.lock() {
            Ok(mut charting) => charting.feed.take(),
            Err(poisoned) => poisoned.into_inner().feed.take(),
        };
        drop(feed);
    }
}
