//! Nearest-available driver selection inside a reservation unit of work.

use thiserror::Error;

use crate::config::schema::MatchingConfig;
use crate::location::{GeoPoint, NearbyDriver};
use crate::storage::{StoreError, UnitOfWork};

/// Why no driver was reserved.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("no driver available within {radius_km} km")]
    NoDriverAvailable { radius_km: f64 },

    /// Candidates existed but were held by concurrent requests, or the unit
    /// of work ran out of time. Worth retrying.
    #[error("selection contended ({skipped} candidates locked)")]
    Contention { skipped: usize },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SelectionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(_) | StoreError::LockTimeout(_) => {
                SelectionError::Contention { skipped: 0 }
            }
            other => SelectionError::Store(other),
        }
    }
}

/// Picks and reserves the nearest free driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverSelector {
    radius_km: f64,
    candidate_limit: usize,
}

impl DriverSelector {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            radius_km: config.search_radius_km,
            candidate_limit: config.candidate_limit.max(1),
        }
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Lock the nearest unlocked available driver and stage its reservation.
    ///
    /// The returned driver stays locked until `tx` finishes.
    pub fn select<T: UnitOfWork>(&self, tx: &mut T, pickup: &GeoPoint) -> Result<NearbyDriver, SelectionError> {
        let scan = tx.lock_nearest_available(pickup, self.radius_km, self.candidate_limit)?;
        match scan.chosen {
            Some(candidate) => {
                tx.reserve_driver(&candidate.driver.id)?;
                Ok(candidate)
            }
            None if scan.skipped_locked > 0 => Err(SelectionError::Contention {
                skipped: scan.skipped_locked,
            }),
            None => Err(SelectionError::NoDriverAvailable {
                radius_km: self.radius_km,
            }),
        }
    }
}
