//! WebSocket upgrade handler and per-connection session plumbing

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{SessionCommand, SessionHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Buffer for messages addressed to one specific client (join reply, pong)
const DIRECT_CHANNEL_CAPACITY: usize = 32;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.session.clone()))
}

/// Handle the upgraded WebSocket connection.
///
/// Each connection gets an opaque id for its lifetime. The socket is split:
/// the writer task multiplexes session broadcasts with direct replies, the
/// reader loop parses client messages and forwards them as session commands.
async fn handle_socket(socket: WebSocket, session: SessionHandle) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "new connection");

    let (ws_sink, ws_stream) = socket.split();
    let (direct_tx, direct_rx) = mpsc::channel::<ServerMsg>(DIRECT_CHANNEL_CAPACITY);
    let events_rx = session.subscribe();

    let writer = tokio::spawn(write_loop(conn_id, ws_sink, events_rx, direct_rx));

    read_loop(conn_id, ws_stream, &session, direct_tx).await;

    // One leave per connection, whether the client closed cleanly or not.
    // Leaving twice is harmless; the registry ignores unknown ids.
    session.send(SessionCommand::Leave { conn_id }).await;
    writer.abort();

    info!(conn_id = %conn_id, "connection closed");
}

/// Forward session broadcasts and direct replies to the socket
async fn write_loop(
    conn_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut events_rx: broadcast::Receiver<ServerMsg>,
    mut direct_rx: mpsc::Receiver<ServerMsg>,
) {
    loop {
        let msg = tokio::select! {
            direct = direct_rx.recv() => match direct {
                Some(msg) => msg,
                None => break,
            },
            event = events_rx.recv() => match event {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // A slow client misses snapshots; the next one supersedes
                    // them, so this never stalls the session for others
                    warn!(conn_id = %conn_id, skipped = n, "client lagging, dropping snapshots");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(conn_id = %conn_id, error = %e, "socket send failed");
            break;
        }
    }
}

/// Parse inbound frames into commands until the socket closes
async fn read_loop(
    conn_id: Uuid,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    session: &SessionHandle,
    direct_tx: mpsc::Sender<ServerMsg>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn_id = %conn_id, "rate limited inbound message");
                    continue;
                }

                // Malformed payloads are dropped without touching the session
                // or the connection
                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(conn_id = %conn_id, error = %e, "unparseable client message");
                        continue;
                    }
                };

                dispatch(conn_id, msg, session, &direct_tx).await;
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "binary frame ignored");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "socket error");
                break;
            }
        }
    }
}

/// Route one parsed message to the session or answer it directly
async fn dispatch(
    conn_id: Uuid,
    msg: ClientMsg,
    session: &SessionHandle,
    direct_tx: &mpsc::Sender<ServerMsg>,
) {
    match msg {
        ClientMsg::Join { name } => {
            let (reply_tx, reply_rx) = oneshot::channel();
            session
                .send(SessionCommand::Join {
                    conn_id,
                    name,
                    reply: reply_tx,
                })
                .await;

            // The join reply goes only to the joining client; roster updates
            // for everyone else travel over the broadcast channel
            match reply_rx.await {
                Ok(joined) => {
                    let _ = direct_tx.send(joined).await;
                }
                Err(_) => debug!(conn_id = %conn_id, "session dropped join reply"),
            }
        }
        ClientMsg::Inputs(patch) => {
            session.send(SessionCommand::Inputs { conn_id, patch }).await;
        }
        ClientMsg::Rename { name } => {
            session.send(SessionCommand::Rename { conn_id, name }).await;
        }
        ClientMsg::Ping { t } => {
            // Answered here; latency probes never enter the simulation loop
            let _ = direct_tx.send(ServerMsg::Pong { t }).await;
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
