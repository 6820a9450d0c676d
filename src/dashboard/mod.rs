//! Dashboard
//!
//! Server-side model of the MK2 dashboard page. Each connected page owns a
//! [`SessionGate`]; once a user logs in the gate wires the page against
//! `UsersData/{uid}`:
//!
//! - **Charts**: three live spline charts (power supply, energy diverted,
//!   power at load) with a sliding window
//! - **Range**: the stored chart range drives how many readings the charts
//!   replay; every change rebuilds them
//! - **Summary**: cards showing the latest reading
//! - **History**: a paginated, newest-first table of all readings
//!
//! Everything the page should render is pushed as a
//! [`ServerMessage`](crate::websocket::ServerMessage) through a [`UiSink`].

mod chart;
mod feed;
mod range;
mod session;
mod summary;
mod table;
pub mod time_format;

use tokio::sync::mpsc;

use crate::websocket::ServerMessage;

/// Outbound channel to one dashboard page
pub type UiSink = mpsc::UnboundedSender<ServerMessage>;

pub use chart::{ChartConfig, ChartPoint, ChartSeries, ChartSet, ChartSpec, ChartView, DEFAULT_WINDOW};
pub use feed::{FeedSubscription, LiveFeed};
pub use range::RangeController;
pub use session::{delete_all, DashboardSession, Session, SessionGate, ViewState};
pub use summary::{display_value, SummaryCard};
pub use table::{HistoryPaginator, HistoryTable, TableRow, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};
pub use time_format::{to_axis_time, to_date_time, to_date_time_in, DATE_TIME_FORMAT};
