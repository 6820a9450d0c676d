//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.
//! Each connection is one dashboard page: it owns a [`SessionGate`] and
//! translates client commands into dashboard operations.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hub::ConnectionHub;
use super::messages::{ClientMessage, ServerMessage};
use crate::api::AppState;
use crate::auth::TokenVerifier;
use crate::dashboard::{SessionGate, UiSink};
use crate::storage::StorageError;

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// What a connection needs besides its session gate
pub(crate) struct ConnectionContext {
    pub connection_id: String,
    pub hub: Arc<ConnectionHub>,
    pub verifier: TokenVerifier,
    pub ui: UiSink,
}

impl ConnectionContext {
    fn reply(&self, message: ServerMessage) {
        let _ = self.ui.send(message);
    }

    fn reply_error(&self, message: impl Into<String>) {
        self.reply(ServerMessage::error(message));
    }
}

fn to_text(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let hub = Arc::clone(&state.ws_hub);

    // Create channel for sending messages to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = match hub.register(tx.clone()).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register WebSocket connection");
            if let Some(msg) = to_text(&ServerMessage::error(e.to_string())) {
                let _ = sender.send(msg).await;
            }
            return;
        }
    };

    let ctx = ConnectionContext {
        connection_id: connection_id.clone(),
        hub: Arc::clone(&hub),
        verifier: state.verifier.clone(),
        ui: tx.clone(),
    };
    let mut gate = SessionGate::new(Arc::clone(&state.db), state.dashboard.clone(), tx);

    // Connected first, then the login view
    ctx.reply(ServerMessage::Connected {
        connection_id: connection_id.clone(),
    });
    if let Err(e) = gate.on_session_change(None) {
        tracing::warn!(connection_id = %connection_id, error = %e, "Failed to show login view");
    }

    let conn_id_for_send = connection_id.clone();

    // Task to forward messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Some(frame) = to_text(&msg) else {
                continue;
            };
            if sender.send(frame).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
        }
    });

    // Task to receive messages from WebSocket and drive the dashboard
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&ctx, &mut gate, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %ctx.connection_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
        // Dropping the gate ends the user's subscriptions
        drop(gate);
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.unregister(&connection_id).await;
}

/// Handle a received WebSocket frame
///
/// Returns false if the connection should be closed.
pub(crate) async fn handle_ws_message(
    ctx: &ConnectionContext,
    gate: &mut SessionGate,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_client_message(ctx, gate, client_msg).await,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %ctx.connection_id,
                        error = %e,
                        "Invalid client message"
                    );
                    ctx.reply_error(format!("Invalid message format: {}", e));
                }
            }
            true
        }
        Message::Binary(_) => {
            ctx.reply_error("Binary messages not supported");
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %ctx.connection_id, "Client requested close");
            false
        }
    }
}

/// Handle a parsed client command
pub(crate) async fn handle_client_message(
    ctx: &ConnectionContext,
    gate: &mut SessionGate,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Login { token } => {
            let session = match ctx.verifier.verify(&token) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::info!(connection_id = %ctx.connection_id, error = %e, "Login rejected");
                    ctx.reply_error(e.to_string());
                    None
                }
            };
            let uid = session.as_ref().map(|s| s.uid.clone());
            if let Err(e) = ctx.hub.bind_user(&ctx.connection_id, uid).await {
                tracing::debug!(connection_id = %ctx.connection_id, error = %e, "Hub bind failed");
            }
            if let Err(e) = gate.on_session_change(session) {
                tracing::error!(connection_id = %ctx.connection_id, error = %e, "Session start failed");
            }
        }
        ClientMessage::Logout => {
            if let Err(e) = ctx.hub.bind_user(&ctx.connection_id, None).await {
                tracing::debug!(connection_id = %ctx.connection_id, error = %e, "Hub bind failed");
            }
            if let Err(e) = gate.on_session_change(None) {
                tracing::warn!(connection_id = %ctx.connection_id, error = %e, "Logout failed");
            }
        }
        ClientMessage::Ping => ctx.reply(ServerMessage::Pong),
        command => {
            let Some(session) = gate.active_mut() else {
                ctx.reply_error("Not logged in");
                return;
            };
            let result = match command {
                ClientMessage::SetRange { range } => session.set_range(range),
                ClientMessage::ViewData => session.view_data().map(|_| ()),
                ClientMessage::LoadMore => session.load_more().map(|_| ()),
                ClientMessage::HideData => {
                    session.hide_data();
                    Ok(())
                }
                ClientMessage::DeleteAll => session.delete_all().map(|_| ()),
                ClientMessage::Login { .. } | ClientMessage::Logout | ClientMessage::Ping => Ok(()),
            };
            match result {
                Ok(()) => {}
                Err(e @ StorageError::InvalidRange(_)) => ctx.reply_error(e.to_string()),
                Err(e) => {
                    tracing::warn!(connection_id = %ctx.connection_id, error = %e, "Dashboard command failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;
    use crate::dashboard::ViewState;
    use crate::storage::{Reading, RealtimeDatabase};
    use crate::websocket::HubConfig;

    const SECRET: &str = "handler-test-secret";

    struct Harness {
        ctx: ConnectionContext,
        gate: SessionGate,
        db: Arc<RealtimeDatabase>,
        rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    async fn harness() -> Harness {
        let db = Arc::new(RealtimeDatabase::in_memory());
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = hub.register(tx.clone()).await.unwrap();

        Harness {
            ctx: ConnectionContext {
                connection_id,
                hub,
                verifier: TokenVerifier::new(SECRET),
                ui: tx.clone(),
            },
            gate: SessionGate::new(Arc::clone(&db), DashboardConfig::default(), tx),
            db,
            rx,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    async fn send(h: &mut Harness, json: &str) -> bool {
        handle_ws_message(&h.ctx, &mut h.gate, Message::Text(json.to_string())).await
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let mut h = harness().await;
        let token = TokenVerifier::new(SECRET)
            .issue("u1", Some("me@example.com"), 1)
            .unwrap();

        assert!(send(&mut h, &format!(r#"{{"type":"login","token":"{}"}}"#, token)).await);
        assert!(h.gate.active().is_some());
        assert_eq!(h.ctx.hub.user_connection_count("u1").await, 1);
        assert!(drain(&mut h.rx).contains(&ServerMessage::View {
            view: ViewState::Authenticated {
                email: Some("me@example.com".to_string())
            }
        }));

        assert!(send(&mut h, r#"{"type":"logout"}"#).await);
        assert!(h.gate.active().is_none());
        assert_eq!(h.ctx.hub.user_connection_count("u1").await, 0);
    }

    #[tokio::test]
    async fn test_invalid_token_shows_login_view() {
        let mut h = harness().await;
        send(&mut h, r#"{"type":"login","token":"garbage"}"#).await;

        assert!(h.gate.active().is_none());
        let messages = drain(&mut h.rx);
        assert!(messages.iter().any(|m| matches!(m, ServerMessage::Error { .. })));
        assert!(messages.contains(&ServerMessage::View {
            view: ViewState::LoggedOut
        }));
    }

    #[tokio::test]
    async fn test_commands_require_login() {
        let mut h = harness().await;
        send(&mut h, r#"{"type":"view_data"}"#).await;
        assert_eq!(drain(&mut h.rx), vec![ServerMessage::error("Not logged in")]);
    }

    #[tokio::test]
    async fn test_dashboard_commands() {
        let mut h = harness().await;
        for ts in 1..=3 {
            h.db.push("UsersData/u1/readings", Reading::new(ts, 1.0, 2.0, 3.0))
                .unwrap();
        }
        let token = TokenVerifier::new(SECRET).issue("u1", None, 1).unwrap();
        send(&mut h, &format!(r#"{{"type":"login","token":"{}"}}"#, token)).await;

        send(&mut h, r#"{"type":"view_data"}"#).await;
        send(&mut h, r#"{"type":"set_range","range":0}"#).await;
        send(&mut h, r#"{"type":"delete_all"}"#).await;
        send(&mut h, r#"{"type":"ping"}"#).await;

        let messages = drain(&mut h.rx);
        assert!(messages.iter().any(|m| matches!(m, ServerMessage::TableLoaded { rows } if rows.len() == 3)));
        assert!(messages.iter().any(|m| matches!(m, ServerMessage::Error { .. })));
        assert!(messages.contains(&ServerMessage::DataDeleted { removed: 3 }));
        assert!(messages.contains(&ServerMessage::Pong));
        assert!(h.db.last("UsersData/u1/readings").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_and_close_frames() {
        let mut h = harness().await;
        assert!(send(&mut h, "not json").await);
        assert!(matches!(
            drain(&mut h.rx).as_slice(),
            [ServerMessage::Error { .. }]
        ));

        assert!(handle_ws_message(&h.ctx, &mut h.gate, Message::Binary(vec![1, 2])).await);
        assert!(!handle_ws_message(&h.ctx, &mut h.gate, Message::Close(None)).await);
    }
}
