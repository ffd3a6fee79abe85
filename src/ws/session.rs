//! One connection's lifetime, from greeting to deregistration.
//!
//! The socket is split: a writer task owns the sink and drains the
//! connection's outbound queue, while the session loop owns the stream. The
//! greeting, relays and echoes go through the queue so per-connection order is
//! the order things were queued in. The close frame is recorded on the handle
//! instead; once the latch trips the writer flushes the queue and sends it
//! last.
//!
//! Loop shape:
//!
//! ```text
//! greet -> [ arm watchdog -> wait for frame | close latch -> disarm -> process -> send ]* -> close -> deregister
//! ```
//!
//! The watchdog and the loop may both try to close; [`ConnectionHandle::close`]
//! is latched so the loser's close is a no-op.

use axum::extract::ws::{close_code, Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::processor::process;
use crate::connection::{ConnectionHandle, ConnectionId, OutboundClosed, INACTIVITY_REASON};
use crate::registry::Registration;
use crate::watchdog::{Watchdog, WatchdogState};
use crate::AppState;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
    #[error("outbound queue closed")]
    OutboundClosed,
}

impl From<OutboundClosed> for SessionError {
    fn from(_: OutboundClosed) -> Self {
        Self::OutboundClosed
    }
}

/// How a session ended without a transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// Peer sent a close frame; the same status and reason go back.
    PeerClosed { code: u16, reason: String },
    /// Stream ended without a close frame.
    Disconnected,
    /// The watchdog closed the connection.
    IdleTimeout,
}

#[derive(Clone, Copy)]
enum FrameKind {
    Text,
    Binary,
}

/// Run a connection until it closes. Errors are logged, never returned.
pub async fn run_session(socket: WebSocket, state: AppState) {
    let id = ConnectionId::new();
    let (sink, stream) = socket.split();
    drive(id, sink, stream, &state).await.ok();
}

#[instrument(skip_all, fields(connection_id = %id))]
async fn drive<Si, St>(
    id: ConnectionId,
    sink: Si,
    mut stream: St,
    state: &AppState,
) -> Result<Exit, SessionError>
where
    Si: Sink<Message, Error = axum::Error> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let server = &state.config.server;
    let (tx, rx) = mpsc::channel::<Message>(server.outbound_queue.max(1));
    let handle = ConnectionHandle::new(id, tx);
    let mut writer = tokio::spawn(write_frames(sink, rx, handle.clone()));
    let registration = Registration::new(&state.registry, handle.clone());
    info!(active = state.registry.len(), "Client connected");

    let outcome = match receive_loop(&handle, &mut stream, state).await {
        // Queue went away because the watchdog's close ended the writer.
        Err(SessionError::OutboundClosed) if handle.is_closing() => Ok(Exit::IdleTimeout),
        other => other,
    };

    let (code, reason) = match &outcome {
        Ok(Exit::PeerClosed { code, reason }) => (*code, reason.as_str()),
        _ => (close_code::NORMAL, ""),
    };
    handle.close(code, reason);

    if tokio::time::timeout(server.close_grace(), &mut writer)
        .await
        .is_err()
    {
        warn!("Close frame not flushed within grace period, dropping socket");
        writer.abort();
    }

    drop(registration);

    match &outcome {
        Ok(exit) => info!(?exit, "Client disconnected"),
        Err(e) => warn!("Session ended: {e}"),
    }
    outcome
}

async fn receive_loop<St>(
    handle: &ConnectionHandle,
    stream: &mut St,
    state: &AppState,
) -> Result<Exit, SessionError>
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    handle
        .send_text(format!("Connection ID: {}", handle.id()))
        .await?;

    let closer = handle.clone();
    let mut watchdog = Watchdog::new(state.config.server.idle_timeout(), move || {
        if closer.close(close_code::NORMAL, INACTIVITY_REASON) {
            info!(connection_id = %closer.id(), "Inactivity timeout, closing connection");
        }
    });

    loop {
        watchdog.arm();
        let frame = tokio::select! {
            biased;
            () = handle.closed() => return Ok(Exit::IdleTimeout),
            frame = stream.next() => frame,
        };
        if watchdog.disarm() == WatchdogState::Fired {
            return Ok(Exit::IdleTimeout);
        }

        let Some(frame) = frame else {
            return Ok(Exit::Disconnected);
        };
        match frame? {
            Message::Text(text) => respond(handle, text.as_str(), FrameKind::Text, state).await?,
            Message::Binary(data) => {
                let text = String::from_utf8_lossy(&data);
                respond(handle, &text, FrameKind::Binary, state).await?;
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(frame) => {
                let (code, reason) = frame.map_or((close_code::NORMAL, String::new()), |f| {
                    (f.code, f.reason.as_str().to_owned())
                });
                return Ok(Exit::PeerClosed { code, reason });
            }
        }
    }
}

async fn respond(
    handle: &ConnectionHandle,
    text: &str,
    kind: FrameKind,
    state: &AppState,
) -> Result<(), SessionError> {
    let reply = process(text, handle.id(), &state.registry, &state.commands);

    if let Some(history) = reply.relay {
        handle.send_text(history).await?;
    }

    let echo = match kind {
        FrameKind::Text => Message::Text(reply.echo.into()),
        FrameKind::Binary => Message::Binary(reply.echo.into_bytes().into()),
    };
    handle.send(echo).await?;
    Ok(())
}

/// Forward queued frames to the socket until the handle is closed, then
/// flush what is left and finish with the close frame.
async fn write_frames<Si>(
    mut sink: Si,
    mut rx: mpsc::Receiver<Message>,
    handle: ConnectionHandle,
)
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
{
    if let Err(e) = forward(&mut sink, &mut rx, &handle).await {
        // Peer already closed or the socket broke; either way we are done.
        debug!("WS send failed: {e}");
    }
    sink.close().await.ok();
}

async fn forward<Si>(
    sink: &mut Si,
    rx: &mut mpsc::Receiver<Message>,
    handle: &ConnectionHandle,
) -> Result<(), axum::Error>
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(msg) => sink.send(msg).await?,
                None => return Ok(()),
            },
            () = handle.closed() => break,
        }
    }

    while let Ok(msg) = rx.try_recv() {
        sink.send(msg).await?;
    }
    if let Some(frame) = handle.close_frame() {
        sink.send(Message::Close(Some(frame))).await?;
    }
    Ok(())
}
