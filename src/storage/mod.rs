//! Storage contracts and the in-memory engine behind them.
//!
//! # Data Flow
//! ```text
//! Dispatcher ── begin(deadline) ──▶ UnitOfWork
//!     lock_nearest_available   (try-lock rows, skip ones held elsewhere)
//!     reserve_driver           (staged: available = false)
//!     insert_ride              (staged: status = requested)
//!     commit                   (one write: reservation + ride, then unlock)
//!
//! Notifier ── PendingStore (enqueue / drain in sequence order / remove)
//! Ledger   ── RideRecords  (identity-scoped reads, lifecycle transitions)
//! Location ── DriverDirectory (position upserts, nearby queries)
//! ```
//!
//! # Design Decisions
//! - Per-driver row locks are only ever try-locked by selection, so competing
//!   requests skip a contended driver instead of queueing behind it
//! - Staged writes become visible in a single table write; a dropped unit of
//!   work leaves no trace
//! - Every unit of work carries a deadline checked at each step and at commit
//! - Store-level outages surface as `StoreError::Unavailable`, never as "no rows"

pub mod memory;
pub mod snapshot;
pub mod types;

use std::future::Future;
use std::time::Duration;

use crate::ledger::{Ride, RideId, RideStatus};
use crate::location::{DriverId, DriverProfile, DriverRecord, GeoPoint, NearbyDriver};

pub use memory::{MemoryStore, MemoryTransaction};
pub use types::{PendingNotification, SelectionScan, StoreError, StoreResult, StoreSnapshot};

/// Driver positions and availability.
pub trait DriverDirectory: Send + Sync {
    /// Overwrite a driver's position. Availability is left untouched; drivers
    /// seen for the first time start out available.
    fn upsert_location(&self, driver: &DriverId, position: GeoPoint) -> StoreResult<DriverRecord>;

    /// Create or update a driver with profile attributes.
    fn register_driver(
        &self,
        driver: &DriverId,
        profile: DriverProfile,
        position: GeoPoint,
    ) -> StoreResult<DriverRecord>;

    fn get_driver(&self, driver: &DriverId) -> StoreResult<Option<DriverRecord>>;

    /// Available drivers within `radius_km`, nearest first, at most `limit`.
    fn query_nearby(
        &self,
        point: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> StoreResult<Vec<NearbyDriver>>;

    /// Take a driver on or off duty. Waits at most `wait` for the row lock.
    fn set_availability(
        &self,
        driver: &DriverId,
        available: bool,
        wait: Duration,
    ) -> impl Future<Output = StoreResult<DriverRecord>> + Send;
}

/// A store that can open reservation transactions.
pub trait DispatchStore: Send + Sync {
    type Tx<'s>: UnitOfWork
    where
        Self: 's;

    /// Open a unit of work that must commit within `deadline`.
    fn begin(&self, deadline: Duration) -> StoreResult<Self::Tx<'_>>;
}

/// One atomic reservation: select, reserve, insert, commit.
pub trait UnitOfWork {
    /// Lock the nearest available driver in radius that no other unit of work
    /// holds. Locked candidates are skipped and counted; `limit` bounds only
    /// the unlocked candidates examined.
    fn lock_nearest_available(
        &mut self,
        pickup: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> StoreResult<SelectionScan>;

    /// Stage `available = false` for a driver locked by this unit of work.
    fn reserve_driver(&mut self, driver: &DriverId) -> StoreResult<()>;

    /// Stage a ride row.
    fn insert_ride(&mut self, ride: Ride) -> StoreResult<()>;

    /// Apply all staged writes at once and release row locks.
    fn commit(self) -> StoreResult<()>;

    /// Discard staged writes and release row locks.
    fn rollback(self);
}

/// Ride rows outside the reservation transaction.
pub trait RideRecords: Send + Sync {
    fn get_ride(&self, id: RideId) -> StoreResult<Option<Ride>>;

    /// Move a ride to `next`. Terminal states release the driver in the same write.
    fn transition_ride(
        &self,
        id: RideId,
        next: RideStatus,
        strict: bool,
        wait: Duration,
    ) -> impl Future<Output = StoreResult<Ride>> + Send;
}

/// Durable queue of undelivered assignment events.
pub trait PendingStore: Send + Sync {
    fn enqueue_pending(
        &self,
        driver: &DriverId,
        ride: RideId,
        status: RideStatus,
    ) -> StoreResult<PendingNotification>;

    /// Pending entries for one driver in creation order.
    fn pending_for(&self, driver: &DriverId) -> StoreResult<Vec<PendingNotification>>;

    /// Returns false if the entry was already gone.
    fn remove_pending(&self, seq: u64) -> StoreResult<bool>;

    fn pending_count(&self) -> StoreResult<usize>;
}
