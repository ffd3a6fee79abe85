//! Connection identity and the shared handle to a connection's outbound side.
//!
//! A [`ConnectionHandle`] is what the registry and the watchdog hold. The
//! session loop owns the socket itself; everyone else talks to it through the
//! handle's outbound queue. Closing is latched so the watchdog and the session
//! loop can both ask for a close without stepping on each other.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Close reason used when the watchdog ends an idle connection.
pub const INACTIVITY_REASON: &str = "Inactivity timeout";

/// Randomly generated identifier assigned to a connection at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Fresh v4 identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

/// Accepts hyphenated, simple, braced and urn forms.
impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Returned when the outbound queue has no writer left to drain it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundClosed;

/// Cloneable reference to an open connection.
///
/// The registry stores one of these per active connection and the watchdog
/// callback captures another. Neither owns the socket.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    connected_at: Instant,
    outbound: mpsc::Sender<Message>,
    closing: Arc<AtomicBool>,
    close_frame: Arc<OnceLock<CloseFrame>>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            connected_at: Instant::now(),
            outbound,
            closing: Arc::new(AtomicBool::new(false)),
            close_frame: Arc::new(OnceLock::new()),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Queue a frame for the writer. Fails once the writer has gone away.
    pub async fn send(&self, msg: Message) -> Result<(), OutboundClosed> {
        self.outbound.send(msg).await.map_err(|_| OutboundClosed)
    }

    /// Queue a text frame.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), OutboundClosed> {
        let text: String = text.into();
        self.send(Message::Text(text.into())).await
    }

    /// Request a close with the given status and reason.
    ///
    /// Only the first call has any effect; it records the close frame and
    /// trips the latch. The writer sends the frame after whatever was already
    /// queued, so a full queue never loses it. Returns whether this call was
    /// the one that closed.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.close_frame.get_or_init(|| CloseFrame {
            code,
            reason: reason.into(),
        });
        self.closed.cancel();
        true
    }

    /// The frame recorded by the first [`close`](Self::close), if any.
    pub fn close_frame(&self) -> Option<CloseFrame> {
        self.close_frame.get().cloned()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Resolves once [`close`](Self::close) has been called by anyone.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::close_code;

    #[test]
    fn test_id_parses_all_uuid_forms() {
        let id = ConnectionId::new();
        let hyphenated = id.to_string();
        let simple = id.as_uuid().simple().to_string();
        let braced = id.as_uuid().braced().to_string();

        assert_eq!(hyphenated.parse::<ConnectionId>().unwrap(), id);
        assert_eq!(simple.parse::<ConnectionId>().unwrap(), id);
        assert_eq!(braced.parse::<ConnectionId>().unwrap(), id);
        assert!("W".parse::<ConnectionId>().is_err());
        assert!("".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn test_id_display_is_lowercase_hyphenated() {
        let uuid = Uuid::parse_str("6F9619FF-8B86-D011-B42D-00CF4FC964FF").unwrap();
        assert_eq!(
            ConnectionId::from(uuid).to_string(),
            "6f9619ff-8b86-d011-b42d-00cf4fc964ff"
        );
    }

    #[tokio::test]
    async fn test_close_is_latched() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(ConnectionId::new(), tx);
        assert!(handle.close_frame().is_none());

        assert!(handle.close(close_code::NORMAL, INACTIVITY_REASON));
        assert!(!handle.close(4000, "second"));
        assert!(handle.is_closing());

        let frame = handle.close_frame().unwrap();
        assert_eq!(frame.code, close_code::NORMAL);
        assert_eq!(frame.reason.as_str(), INACTIVITY_REASON);
        // The frame is handed to the writer directly, not through the queue.
        assert!(rx.try_recv().is_err());

        // Already tripped, so this returns immediately.
        handle.closed().await;
    }

    #[tokio::test]
    async fn test_close_without_writer_is_harmless() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = ConnectionHandle::new(ConnectionId::new(), tx);

        assert!(handle.close(close_code::NORMAL, ""));
        assert!(handle.send_text("late").await.is_err());
    }

    #[tokio::test]
    async fn test_close_with_full_queue_keeps_frame() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(ConnectionId::new(), tx);
        handle.send_text("queued").await.unwrap();

        assert!(handle.close(close_code::NORMAL, INACTIVITY_REASON));
        assert!(matches!(rx.try_recv(), Ok(Message::Text(_))));
        assert_eq!(
            handle.close_frame().map(|f| f.reason.as_str().to_owned()),
            Some(INACTIVITY_REASON.to_string())
        );
    }
}
