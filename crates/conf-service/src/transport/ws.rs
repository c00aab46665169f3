//! WebSocket endpoint.
//!
//! One socket is split into two halves:
//!
//! - a writer task draining the outbound queue into JSON text frames and
//!   pinging on the heartbeat interval;
//! - the reader loop, which feeds text frames to the handler and treats a
//!   silent peer (no frame, not even a pong, within the heartbeat timeout)
//!   as disconnected.
//!
//! When either half stops, the handler's disconnect path runs exactly once.

use crate::actors::ConferenceControllerHandle;
use crate::config::Config;
use crate::handler::{CallerIdentity, ConnectionHandler, PERMISSIONS_HEADER, USER_ID_HEADER};
use crate::protocol::ServerEvent;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use common::types::ConnectionId;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Close code sent after a terminal event (normal closure).
const CLOSE_NORMAL: u16 = 1000;
/// Close code sent when the server is going away.
const CLOSE_GOING_AWAY: u16 = 1001;
/// How long the reader waits for the writer to flush after disconnect.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat and queue sizing for each socket.
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub outbound_buffer: usize,
}

impl From<&Config> for TransportConfig {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
            outbound_buffer: config.connection_buffer,
        }
    }
}

/// Shared state for the `/ws` route.
#[derive(Clone)]
pub struct TransportState {
    pub controller: ConferenceControllerHandle,
    pub config: TransportConfig,
    /// Cancelled when the process begins shutting down.
    pub shutdown: CancellationToken,
}

/// Router exposing `GET /ws`.
pub fn ws_router(state: TransportState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    State(state): State<TransportState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let caller = CallerIdentity::from_headers(
        header_str(&headers, USER_ID_HEADER),
        header_str(&headers, PERMISSIONS_HEADER),
    );
    ws.on_upgrade(move |socket| handle_socket(socket, state, caller))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[instrument(skip_all, name = "conf.transport.socket", fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: TransportState, caller: CallerIdentity) {
    let connection_id = ConnectionId::generate();
    tracing::Span::current().record("connection_id", connection_id.as_str());
    info!(target: "conf.transport", connection_id = %connection_id, "Socket attached");

    let (sink, stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.outbound_buffer);

    // Stops the reader once the writer has closed the socket.
    let writer_done = CancellationToken::new();
    let writer = tokio::spawn(run_writer(
        sink,
        outbound_rx,
        state.config.heartbeat_interval,
        state.shutdown.clone(),
        writer_done.clone(),
    ));

    let mut handler = ConnectionHandler::new(
        connection_id.clone(),
        caller,
        state.controller.clone(),
        outbound_tx,
    );
    handler.on_attach().await;

    run_reader(
        stream,
        &mut handler,
        state.config.heartbeat_timeout,
        &state.shutdown,
        &writer_done,
    )
    .await;

    handler.on_disconnect().await;
    // Dropping the handler releases the last transport-side sender; the
    // conference side released its clone when it dropped the connection.
    drop(handler);
    finish_writer(writer, &connection_id).await;

    info!(target: "conf.transport", connection_id = %connection_id, "Socket detached");
}

async fn run_reader(
    mut stream: SplitStream<WebSocket>,
    handler: &mut ConnectionHandler,
    heartbeat_timeout: Duration,
    shutdown: &CancellationToken,
    writer_done: &CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            () = writer_done.cancelled() => break,
            frame = tokio::time::timeout(heartbeat_timeout, stream.next()) => frame,
        };

        let Ok(frame) = frame else {
            warn!(
                target: "conf.transport",
                connection_id = %handler.connection_id(),
                "Heartbeat timeout, disconnecting"
            );
            break;
        };

        match frame {
            Some(Ok(Message::Text(text))) => handler.on_text(&text).await,
            Some(Ok(Message::Binary(_))) => {
                debug!(
                    target: "conf.transport",
                    connection_id = %handler.connection_id(),
                    "Ignoring binary frame"
                );
            }
            // Any frame counts as liveness; axum answers pings itself.
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                debug!(
                    target: "conf.transport",
                    connection_id = %handler.connection_id(),
                    error = %e,
                    "Socket read failed"
                );
                break;
            }
        }
    }
}

async fn run_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerEvent>,
    heartbeat_interval: Duration,
    shutdown: CancellationToken,
    done: CancellationToken,
) {
    let mut ping = tokio::time::interval(heartbeat_interval);
    ping.reset();

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else {
                    let _ = sink.send(close_frame(CLOSE_NORMAL, "closed")).await;
                    break;
                };
                let terminal = event.is_terminal();
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(target: "conf.transport", error = %e, "Failed to encode event");
                    }
                }
                if terminal {
                    let _ = sink.send(close_frame(CLOSE_NORMAL, event.kind_label())).await;
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            () = shutdown.cancelled() => {
                // Flush whatever the conference already queued.
                while let Ok(event) = outbound.try_recv() {
                    if let Ok(text) = serde_json::to_string(&event) {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                let _ = sink.send(close_frame(CLOSE_GOING_AWAY, "server_shutdown")).await;
                break;
            }
        }
    }

    done.cancel();
}

fn close_frame(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}

async fn finish_writer(writer: JoinHandle<()>, connection_id: &ConnectionId) {
    match tokio::time::timeout(WRITER_FLUSH_TIMEOUT, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(
                target: "conf.transport",
                connection_id = %connection_id,
                error = %e,
                "Writer task failed"
            );
        }
        Err(_) => {
            warn!(
                target: "conf.transport",
                connection_id = %connection_id,
                "Writer did not finish in time"
            );
        }
    }
}
