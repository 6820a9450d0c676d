//! WebSocket Message Types
//!
//! Defines all message types exchanged between a dashboard page and the
//! MK2 monitor server.

use serde::{Deserialize, Serialize};

use crate::dashboard::{ChartSpec, SummaryCard, TableRow, ViewState};

/// Messages sent from the page to the server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with a bearer token
    Login {
        token: String,
    },
    Logout,
    /// Store a new chart range
    SetRange {
        range: u32,
    },
    /// Open the history table
    ViewData,
    /// Append the next older page to the history table
    LoadMore,
    HideData,
    /// Delete every reading of the logged-in user
    DeleteAll,
    /// Ping for keepalive
    Ping,
}

/// Messages sent from the server to the page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected {
        /// Unique connection identifier
        connection_id: String,
    },
    /// Switch between the login and the dashboard view
    View {
        view: ViewState,
    },
    ChartCreated {
        chart: ChartSpec,
    },
    /// Add a point to a chart, shifting out the oldest when `shift` is set
    PointAdded {
        target: String,
        /// Epoch milliseconds
        x: i64,
        y: f64,
        shift: bool,
    },
    ChartDestroyed {
        target: String,
    },
    /// Charts were rebuilt for a new range
    RangeChanged {
        range: u32,
    },
    /// Latest reading for the summary cards
    Summary {
        card: SummaryCard,
    },
    /// History table opened with its first page, newest first
    TableLoaded {
        rows: Vec<TableRow>,
    },
    /// New reading at the top of the history table
    RowPrepended {
        row: TableRow,
    },
    /// Older readings below the history table
    RowsAppended {
        rows: Vec<TableRow>,
    },
    TableHidden,
    DataDeleted {
        removed: usize,
    },
    /// Pong response to ping
    Pong,
    /// Error message
    Error {
        /// Error description
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
