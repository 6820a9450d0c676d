//! Session Gate
//!
//! Switches a dashboard page between its login view and its authenticated
//! view. When a session becomes active, everything the dashboard shows is
//! wired against the user's storage namespace:
//!
//! - the range controller (charts + charting feed)
//! - the latest-value feed (summary cards)
//! - the history table
//! - the delete-all action
//!
//! When the session goes away the gate only switches the view. The previous
//! `DashboardSession` is dropped, and its subscriptions end with it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::feed::{FeedSubscription, LiveFeed};
use super::range::RangeController;
use super::summary::SummaryCard;
use super::table::{HistoryTable, TableRow};
use super::UiSink;
use crate::config::DashboardConfig;
use crate::storage::{RangeRef, ReadingsRef, RealtimeDatabase, StorageResult, UserPaths};
use crate::websocket::ServerMessage;

/// An authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable user identifier; selects the storage namespace
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Session {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
        }
    }

    /// Builder method: set e-mail shown in the user details
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Which half of the page is visible
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewState {
    LoggedOut,
    Authenticated { email: Option<String> },
}

/// Remove every reading of a user. Irreversible.
pub fn delete_all(readings: &ReadingsRef) -> StorageResult<usize> {
    readings.remove()
}

/// Everything running for one logged-in user on one page
pub struct DashboardSession {
    session: Session,
    paths: UserPaths,
    readings: ReadingsRef,
    range: RangeController,
    table: HistoryTable,
    ui: UiSink,
    _latest: FeedSubscription,
}

impl DashboardSession {
    pub fn start(
        db: Arc<RealtimeDatabase>,
        session: Session,
        settings: &DashboardConfig,
        ui: &UiSink,
    ) -> StorageResult<Self> {
        let paths = UserPaths::for_uid(&session.uid);
        let readings = ReadingsRef::for_user(Arc::clone(&db), &paths);

        let range = RangeController::watch(
            RangeRef::for_user(db, &paths),
            readings.clone(),
            settings,
            ui,
        )?;

        let cards = ui.clone();
        let latest = LiveFeed::start(&readings, 1, move |reading| {
            let _ = cards.send(ServerMessage::Summary {
                card: SummaryCard::from_reading(reading),
            });
        })?;

        let table = HistoryTable::new(readings.clone(), settings.table_page_size, ui);

        tracing::info!(uid = %session.uid, "Dashboard session started");

        Ok(Self {
            session,
            paths,
            readings,
            range,
            table,
            ui: ui.clone(),
            _latest: latest,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn paths(&self) -> &UserPaths {
        &self.paths
    }

    pub fn range(&self) -> &RangeController {
        &self.range
    }

    pub fn table(&self) -> &HistoryTable {
        &self.table
    }

    /// Store a new chart range; charts rebuild when the change comes back
    pub fn set_range(&self, value: u32) -> StorageResult<()> {
        self.range.set_range(value)
    }

    pub fn view_data(&mut self) -> StorageResult<Vec<TableRow>> {
        self.table.open()
    }

    pub fn load_more(&mut self) -> StorageResult<Vec<TableRow>> {
        self.table.load_more()
    }

    pub fn hide_data(&mut self) {
        self.table.hide();
    }

    /// Delete every stored reading of this user
    pub fn delete_all(&self) -> StorageResult<usize> {
        let removed = delete_all(&self.readings)?;
        tracing::info!(uid = %self.session.uid, removed, "All readings deleted");
        let _ = self.ui.send(ServerMessage::DataDeleted { removed });
        Ok(removed)
    }
}

impl Drop for DashboardSession {
    fn drop(&mut self) {
        tracing::info!(uid = %self.session.uid, "Dashboard session ended");
    }
}

/// Per-page gate between the login view and the dashboard
pub struct SessionGate {
    db: Arc<RealtimeDatabase>,
    settings: DashboardConfig,
    ui: UiSink,
    active: Option<DashboardSession>,
}

impl SessionGate {
    pub fn new(db: Arc<RealtimeDatabase>, settings: DashboardConfig, ui: UiSink) -> Self {
        Self {
            db,
            settings,
            ui,
            active: None,
        }
    }

    /// React to a login or logout and tell the page which view to show
    pub fn on_session_change(&mut self, session: Option<Session>) -> StorageResult<ViewState> {
        self.active = None;

        let view = match session {
            Some(session) => {
                let view = ViewState::Authenticated {
                    email: session.email.clone(),
                };
                let _ = self.ui.send(ServerMessage::View { view: view.clone() });
                match DashboardSession::start(Arc::clone(&self.db), session, &self.settings, &self.ui)
                {
                    Ok(started) => self.active = Some(started),
                    Err(e) => {
                        // No dashboard behind the page, so back to the login view
                        let _ = self.ui.send(ServerMessage::View {
                            view: ViewState::LoggedOut,
                        });
                        return Err(e);
                    }
                }
                view
            }
            None => {
                let _ = self.ui.send(ServerMessage::View {
                    view: ViewState::LoggedOut,
                });
                ViewState::LoggedOut
            }
        };

        Ok(view)
    }

    pub fn active(&self) -> Option<&DashboardSession> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut DashboardSession> {
        self.active.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LogQuery, Reading, StorageError};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn gate() -> (SessionGate, Arc<RealtimeDatabase>, mpsc::UnboundedReceiver<ServerMessage>) {
        let db = Arc::new(RealtimeDatabase::in_memory());
        let (ui, rx) = mpsc::unbounded_channel();
        (SessionGate::new(Arc::clone(&db), DashboardConfig::default(), ui), db, rx)
    }

    async fn wait_for_summary(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> SummaryCard {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match rx.recv().await {
                    Some(ServerMessage::Summary { card }) => return card,
                    Some(_) => continue,
                    None => panic!("ui channel closed"),
                }
            }
        })
        .await
        .expect("no summary received")
    }

    #[tokio::test]
    async fn test_logged_out_view() {
        let (mut gate, _db, mut rx) = gate();
        let view = gate.on_session_change(None).unwrap();

        assert_eq!(view, ViewState::LoggedOut);
        assert!(gate.active().is_none());
        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::View {
                view: ViewState::LoggedOut
            })
        );
    }

    #[tokio::test]
    async fn test_login_wires_summary_cards() {
        let (mut gate, db, mut rx) = gate();
        db.push(
            "UsersData/u1/readings",
            Reading::new(1641317355, 120.5, 30.2, 22.1),
        )
        .unwrap();

        let view = gate
            .on_session_change(Some(Session::new("u1").email("me@example.com")))
            .unwrap();
        assert_eq!(
            view,
            ViewState::Authenticated {
                email: Some("me@example.com".to_string())
            }
        );

        let card = wait_for_summary(&mut rx).await;
        assert_eq!(card.power, "120.5");
        assert_eq!(card.diverted, "30.2");
        assert_eq!(card.load, "22.1");

        db.push("UsersData/u1/readings", Reading::new(1641317400, 99.0, 1.5, 3.0))
            .unwrap();
        let card = wait_for_summary(&mut rx).await;
        assert_eq!(card.power, "99");
    }

    #[tokio::test]
    async fn test_failed_start_falls_back_to_login_view() {
        let (mut gate, _db, mut rx) = gate();

        // "a/" yields an empty path segment, which storage rejects
        let result = gate.on_session_change(Some(Session::new("a/")));
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
        assert!(gate.active().is_none());

        let mut views = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let ServerMessage::View { view } = message {
                views.push(view);
            }
        }
        assert_eq!(views.last(), Some(&ViewState::LoggedOut));
    }

    #[tokio::test]
    async fn test_logout_ends_subscriptions() {
        let (mut gate, db, _rx) = gate();
        gate.on_session_change(Some(Session::new("u1"))).unwrap();

        let session = gate.active().unwrap();
        let mut applied = session.range().applied();
        tokio::time::timeout(Duration::from_secs(1), applied.wait_for(|v| v.is_some()))
            .await
            .unwrap()
            .unwrap();
        // Charting feed + latest feed
        assert_eq!(db.subscriber_count("UsersData/u1/readings").unwrap(), 2);

        gate.on_session_change(None).unwrap();
        assert_eq!(db.subscriber_count("UsersData/u1/readings").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_all_empties_namespace() {
        let (mut gate, db, mut rx) = gate();
        for ts in 1..=5 {
            db.push("UsersData/u1/readings", Reading::new(ts, 1.0, 1.0, 1.0))
                .unwrap();
        }
        db.push("UsersData/u2/readings", Reading::new(1, 1.0, 1.0, 1.0))
            .unwrap();

        gate.on_session_change(Some(Session::new("u1"))).unwrap();
        let removed = gate.active().unwrap().delete_all().unwrap();
        assert_eq!(removed, 5);

        let last = db
            .get("UsersData/u1/readings", &LogQuery::all().limit_to_last(1))
            .unwrap();
        assert!(last.is_empty());
        assert!(db.last("UsersData/u2/readings").unwrap().is_some());

        let deleted = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(ServerMessage::DataDeleted { removed }) = rx.recv().await {
                    return removed;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(deleted, 5);
    }

    #[tokio::test]
    async fn test_table_commands() {
        let (mut gate, db, _rx) = gate();
        for ts in 1..=150 {
            db.push("UsersData/u1/readings", Reading::new(ts, 1.0, 1.0, 1.0))
                .unwrap();
        }
        gate.on_session_change(Some(Session::new("u1"))).unwrap();

        let session = gate.active_mut().unwrap();
        assert_eq!(session.view_data().unwrap().len(), 100);
        assert_eq!(session.load_more().unwrap().len(), 50);
        assert!(session.load_more().unwrap().is_empty());
        session.hide_data();
        assert!(!session.table().is_visible());
    }

    #[tokio::test]
    async fn test_set_range_rebuilds_charts() {
        let (mut gate, _db, _rx) = gate();
        gate.on_session_change(Some(Session::new("u1"))).unwrap();

        let session = gate.active().unwrap();
        session.set_range(12).unwrap();

        let mut applied = session.range().applied();
        tokio::time::timeout(Duration::from_secs(1), applied.wait_for(|v| *v == Some(12)))
            .await
            .unwrap()
            .unwrap();
        assert!(session.set_range(0).is_err());
    }
}
