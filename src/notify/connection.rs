//! Driver connection identity, tracking and the outbound event channel.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and guarded deregistration
//! - Count open driver connections
//! - Carry events from the notifier to a connection's writer task, with an
//!   acknowledgement once the write to the socket finished

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::notify::types::{ChannelError, PushEvent};
use crate::resilience::with_timeout;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a driver connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts open driver connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new open connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Driver connection closed");
    }
}

struct Outbound {
    event: PushEvent,
    ack: oneshot::Sender<Result<(), ChannelError>>,
}

/// Create the two ends of a driver channel.
pub fn channel(id: ConnectionId, buffer: usize) -> (DriverChannel, ChannelReceiver) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (DriverChannel { id, tx }, ChannelReceiver { rx })
}

/// Sending end, held by the registry.
///
/// When every clone is dropped the receiving connection sees the channel end
/// and closes, which is how a superseded connection is shut down.
#[derive(Debug, Clone)]
pub struct DriverChannel {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl DriverChannel {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Hand `event` to the connection and wait until it has been written.
    pub async fn deliver(&self, event: PushEvent, timeout: Duration) -> Result<(), ChannelError> {
        let (ack, done) = oneshot::channel();
        let write = async {
            self.tx
                .send(Outbound { event, ack })
                .await
                .map_err(|_| ChannelError::Closed)?;
            done.await.map_err(|_| ChannelError::Closed)?
        };
        with_timeout("channel write", timeout, write)
            .await
            .map_err(|t| ChannelError::Timeout(t.after))?
    }
}

/// Receiving end, owned by the connection's writer task.
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::Receiver<Outbound>,
}

impl ChannelReceiver {
    /// Next event to write, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<PendingWrite> {
        self.rx
            .recv()
            .await
            .map(|o| PendingWrite { event: o.event, ack: o.ack })
    }

    /// Stop accepting events; queued senders observe `Closed`.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// An event waiting to be written. Dropping it reports `Closed` to the sender.
#[derive(Debug)]
pub struct PendingWrite {
    event: PushEvent,
    ack: oneshot::Sender<Result<(), ChannelError>>,
}

impl PendingWrite {
    pub fn event(&self) -> &PushEvent {
        &self.event
    }

    /// Report the write result back to the sender.
    pub fn complete(self, result: Result<(), ChannelError>) {
        let _ = self.ack.send(result);
    }
}
