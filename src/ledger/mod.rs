//! Ride ledger: ride records, lifecycle transitions and identity-scoped reads.
//!
//! # Data Flow
//! ```text
//! Dispatcher (inside reservation UnitOfWork)
//!     └── RideLedger::create_ride ──▶ staged ride (status = requested)
//!
//! HTTP / driver channel
//!     ├── get_ride(id, requester)        rider or assigned driver only
//!     └── advance(id, requester, next)   status machine, releases driver
//!                                        on completed / cancelled
//! ```
//!
//! # Design Decisions
//! - A ride the requester may not see is reported exactly like a missing ride
//! - Ride creation has no standalone entry point: it only exists as a step of
//!   a reservation unit of work, so a ride always implies a reserved driver

pub mod engine;
pub mod types;

pub use engine::RideLedger;
pub use types::{LedgerError, NewRide, Ride, RideId, RideStatus};
