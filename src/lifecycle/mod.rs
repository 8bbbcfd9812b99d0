//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → logging → metrics → restore snapshot → Services::build
//!     → bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → server drains → snapshot task writes final save
//!     → watcher stops → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then services, then listeners
//! - The final snapshot is written after the server stops taking requests

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_signal};
pub use startup::{Services, StartupError};
