//! Dispatch notifications to drivers.
//!
//! # Data Flow
//! ```text
//! Dispatcher (after commit, spawned)
//!     → DispatchNotifier::notify(driver, ride)
//!         ├── live channel? ── deliver (bounded wait for write ack)
//!         │                      └── failed ──▶ PendingStore::enqueue
//!         └── no channel ─────▶ PendingStore::enqueue
//!
//! Driver WebSocket opens
//!     → DispatchNotifier::connect(driver, channel)
//!         → ChannelRegistry::register (supersedes older channel)
//!         → drain pending in creation order, remove each after delivery,
//!           stop at first failure
//!
//! Driver WebSocket closes
//!     → DispatchNotifier::disconnect(driver, connection_id)
//!         → removed only if still the registered connection
//! ```
//!
//! # Design Decisions
//! - Delivery never fails a ride request; the worst case is `Dropped` with
//!   an error log when the store itself is down
//! - A write counts as delivered only once the connection's writer task
//!   acknowledges it
//! - Replay is at-least-once; clients tolerate a repeated ride id

pub mod connection;
pub mod notifier;
pub mod registry;
pub mod types;

pub use connection::{channel, ChannelReceiver, ConnectionId, ConnectionTracker, DriverChannel, PendingWrite};
pub use notifier::DispatchNotifier;
pub use registry::ChannelRegistry;
pub use types::{ChannelError, DriverMessage, EventKind, NotifyOutcome, PushEvent, ReplayReport};
