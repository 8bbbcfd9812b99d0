//! Ride ledger operations.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::identity::Caller;
use crate::ledger::types::{LedgerError, NewRide, Ride, RideId, RideStatus};
use crate::storage::{RideRecords, StoreResult, UnitOfWork};

/// Reads and transitions rides on behalf of a requester.
pub struct RideLedger<S> {
    store: Arc<S>,
    strict: bool,
    lock_wait: Duration,
}

impl<S> Clone for RideLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            strict: self.strict,
            lock_wait: self.lock_wait,
        }
    }
}

impl<S: RideRecords> RideLedger<S> {
    pub fn new(store: Arc<S>, strict: bool, lock_wait: Duration) -> Self {
        Self {
            store,
            strict,
            lock_wait,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Stage a new ride in `tx`. The ride becomes visible only if `tx` commits.
    pub fn create_ride<T: UnitOfWork>(tx: &mut T, new: NewRide) -> StoreResult<Ride> {
        let now = Utc::now();
        let ride = Ride {
            id: RideId::new(),
            rider_id: new.rider_id,
            driver_id: Some(new.driver_id),
            status: RideStatus::Requested,
            pickup: new.pickup,
            dropoff: new.dropoff,
            price: new.price,
            eta_minutes: new.eta_minutes,
            created_at: now,
            updated_at: now,
        };
        tx.insert_ride(ride.clone())?;
        Ok(ride)
    }

    /// Fetch a ride if `requester` is its rider or assigned driver.
    pub fn get_ride(&self, id: RideId, requester: &Caller) -> Result<Ride, LedgerError> {
        match self.store.get_ride(id)? {
            Some(ride) if ride.is_visible_to(requester) => Ok(ride),
            _ => Err(LedgerError::NotFound(id)),
        }
    }

    /// Move a ride to `next` on behalf of `requester`.
    pub async fn advance(
        &self,
        id: RideId,
        requester: &Caller,
        next: RideStatus,
    ) -> Result<Ride, LedgerError> {
        let current = self.get_ride(id, requester)?;
        if !current.status.can_transition_to(next, self.strict) {
            return Err(LedgerError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }
        let ride = self
            .store
            .transition_ride(id, next, self.strict, self.lock_wait)
            .await?;
        tracing::info!(
            ride_id = %id,
            from = %current.status,
            to = %ride.status,
            "Ride status changed"
        );
        Ok(ride)
    }
}
