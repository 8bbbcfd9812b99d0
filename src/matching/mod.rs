//! Driver matching.
//!
//! # Data Flow
//! ```text
//! request_ride(caller, pickup, dropoff?)
//!     → validate caller + coordinates
//!     → loop (≤ max_attempts):
//!         begin unit of work (deadline)
//!         → DriverSelector::select    lock nearest free driver, skip locked
//!         → PricingCalculator::quote
//!         → RideLedger::create_ride   staged in the same unit of work
//!         → commit
//!         contention → backoff, retry; no driver → return immediately
//!     → spawn DispatchNotifier::notify (detached)
//! ```
//!
//! # Design Decisions
//! - The orchestrator alone decides retry vs surface vs swallow
//! - The reservation pass is synchronous, so dropping the request future can
//!   never leave a unit of work half applied
//! - "No driver" is an outcome, not an error

pub mod orchestrator;
pub mod selector;
pub mod types;

pub use orchestrator::Dispatcher;
pub use selector::{DriverSelector, SelectionError};
pub use types::{
    AssignedDriver, DispatchError, DispatchResult, DispatchStage, MatchOutcome, RideAssignment,
};
