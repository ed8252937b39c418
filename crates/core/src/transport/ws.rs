//! The `axum` WebSocket accept loop and per-connection read/write tasks.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::timeout::TimeoutLayer;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::handler::MessageHandler;
use crate::message::Message;
use crate::room_registry::RoomRegistry;
use crate::session::{OutboundSink, SessionRegistry};

/// Outbound capability backed by a bounded `tokio::mpsc` channel.
///
/// `try_send` never blocks and never awaits: on a full channel (a reader
/// too slow to keep up) the message is simply dropped, per spec §5's
/// non-blocking, best-effort send sink. An unbounded channel would never
/// actually drop anything and so could not honor that contract under
/// sustained backpressure.
pub struct SessionSink {
    tx: mpsc::Sender<Message>,
}

const SINK_CAPACITY: usize = 256;

impl OutboundSink for SessionSink {
    fn try_send(&self, message: &Message) -> bool {
        match self.tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Clone)]
struct AppState {
    sessions: SessionRegistry,
    rooms: RoomRegistry,
    config: Arc<SyncConfig>,
}

/// Build the router and serve it on `config.bind_addr` until the process is
/// killed. The only error this returns is a listener bind failure (spec §7
/// *Fatal* — the one error the CLI treats as unrecoverable).
pub async fn serve(config: SyncConfig, sessions: SessionRegistry, rooms: RoomRegistry) -> Result<()> {
    let config = Arc::new(config);
    let state = AppState { sessions, rooms, config: config.clone() };

    let app = Router::new()
        .route("/sync", get(upgrade_handler))
        .layer(TimeoutLayer::new(config.handshake_timeout))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(SyncError::BindFailed)?;

    tracing::info!(addr = %config.bind_addr, "roomsync listening");

    axum::serve(listener, app).await.map_err(|e| SyncError::BindFailed(e.into()))?;
    Ok(())
}

async fn upgrade_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let max_frame_bytes = state.config.max_frame_bytes;
    ws.max_message_size(max_frame_bytes).on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(SINK_CAPACITY);
    let sink: Arc<dyn OutboundSink> = Arc::new(SessionSink { tx });
    let session = state.sessions.create(conn_id.clone(), sink);

    let (mut ws_tx, mut ws_rx) = socket.split();

    let write_task = tokio::spawn(async move {
        let mut rx = rx;
        while let Some(message) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(message.to_wire().into())).await.is_err() {
                break;
            }
        }
    });

    let handler = MessageHandler::new(state.sessions.clone(), state.rooms.clone());
    let idle_timeout = state.config.idle_timeout;

    loop {
        let next = tokio::time::timeout(idle_timeout, ws_rx.next()).await;
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                tracing::warn!(session_id = %session.session_id, error = %e, "websocket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::info!(session_id = %session.session_id, "idle timeout, closing connection");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => handler.handle_message(&session, &text),
            WsMessage::Binary(_) => {
                tracing::warn!(session_id = %session.session_id, "rejecting binary frame");
                session.send(&Message::error("binary frames are not supported"));
                break;
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }

    handler.handle_disconnect(&session);
    state.sessions.remove(&conn_id);
    write_task.abort();
}
