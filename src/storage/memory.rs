//! In-memory dispatch store with per-driver row locks.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ledger::{Ride, RideId, RideStatus};
use crate::location::{DriverId, DriverProfile, DriverRecord, GeoPoint, NearbyDriver};
use crate::storage::types::{
    PendingNotification, SelectionScan, StoreError, StoreResult, StoreSnapshot,
};
use crate::storage::{DispatchStore, DriverDirectory, PendingStore, RideRecords, UnitOfWork};

/// Global counter for transaction ids.
static TX_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct Tables {
    drivers: HashMap<DriverId, DriverRecord>,
    rides: HashMap<RideId, Ride>,
    /// Driver → their live (non-terminal) ride.
    active_rides: HashMap<DriverId, RideId>,
    pending: BTreeMap<u64, PendingNotification>,
    next_seq: u64,
}

/// Process-local store implementing every storage contract.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    row_locks: DashMap<DriverId, Arc<Mutex<()>>>,
    online: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_seq: 1,
                ..Tables::default()
            }),
            row_locks: DashMap::new(),
            online: AtomicBool::new(true),
        }
    }

    /// Rebuild a store from a snapshot. Live-ride bookkeeping is derived from
    /// the non-terminal rides it contains.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut tables = Tables::default();
        for driver in snapshot.drivers {
            tables.drivers.insert(driver.id.clone(), driver);
        }
        for ride in snapshot.rides {
            if let (Some(driver), false) = (&ride.driver_id, ride.status.is_terminal()) {
                tables.active_rides.insert(driver.clone(), ride.id);
            }
            tables.rides.insert(ride.id, ride);
        }
        let mut max_seq = 0;
        for entry in snapshot.pending {
            max_seq = max_seq.max(entry.seq);
            tables.pending.insert(entry.seq, entry);
        }
        tables.next_seq = max_seq + 1;

        Self {
            tables: RwLock::new(tables),
            row_locks: DashMap::new(),
            online: AtomicBool::new(true),
        }
    }

    /// Copy every table.
    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let tables = self.read()?;
        let mut drivers: Vec<_> = tables.drivers.values().cloned().collect();
        drivers.sort_by(|a, b| a.id.cmp(&b.id));
        let mut rides: Vec<_> = tables.rides.values().cloned().collect();
        rides.sort_by_key(|r| r.created_at);
        Ok(StoreSnapshot {
            drivers,
            rides,
            pending: tables.pending.values().cloned().collect(),
        })
    }

    /// Simulate an outage. While offline every operation fails with
    /// `StoreError::Unavailable`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        if online {
            tracing::info!("Store back online");
        } else {
            tracing::warn!("Store marked offline");
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn list_drivers(&self) -> StoreResult<Vec<DriverRecord>> {
        self.ensure_online()?;
        let tables = self.read()?;
        let mut drivers: Vec<_> = tables.drivers.values().cloned().collect();
        drivers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(drivers)
    }

    pub fn ride_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.rides.len())
    }

    /// Every pending entry across drivers, oldest first.
    pub fn all_pending(&self) -> StoreResult<Vec<PendingNotification>> {
        self.ensure_online()?;
        Ok(self.read()?.pending.values().cloned().collect())
    }

    /// The live ride held by a driver, if any.
    pub fn active_ride(&self, driver: &DriverId) -> StoreResult<Option<RideId>> {
        Ok(self.read()?.active_rides.get(driver).copied())
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store is offline".into()))
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("table lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("table lock poisoned".into()))
    }

    fn row_lock(&self, driver: &DriverId) -> Arc<Mutex<()>> {
        self.row_locks.entry(driver.clone()).or_default().clone()
    }

    /// Blocking (bounded) row lock used outside selection.
    async fn lock_row(&self, driver: &DriverId, wait: Duration) -> StoreResult<OwnedMutexGuard<()>> {
        let lock = self.row_lock(driver);
        tokio::time::timeout(wait, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(driver.clone()))
    }
}

/// Available drivers within radius, nearest first with id as tie-break.
fn scan_available(
    drivers: &HashMap<DriverId, DriverRecord>,
    point: &GeoPoint,
    radius_km: f64,
    limit: usize,
) -> Vec<NearbyDriver> {
    let mut found: Vec<NearbyDriver> = drivers
        .values()
        .filter(|d| d.available)
        .filter_map(|d| {
            let distance_km = point.distance_km(&d.position);
            (distance_km <= radius_km).then(|| NearbyDriver {
                driver: d.clone(),
                distance_km,
            })
        })
        .collect();
    found.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.driver.id.cmp(&b.driver.id))
    });
    found.truncate(limit);
    found
}

impl DriverDirectory for MemoryStore {
    fn upsert_location(&self, driver: &DriverId, position: GeoPoint) -> StoreResult<DriverRecord> {
        self.ensure_online()?;
        let mut tables = self.write()?;
        let record = tables
            .drivers
            .entry(driver.clone())
            .and_modify(|r| {
                r.position = position;
                r.updated_at = Utc::now();
            })
            .or_insert_with(|| DriverRecord::new(driver.clone(), position));
        Ok(record.clone())
    }

    fn register_driver(
        &self,
        driver: &DriverId,
        profile: DriverProfile,
        position: GeoPoint,
    ) -> StoreResult<DriverRecord> {
        self.ensure_online()?;
        let mut tables = self.write()?;
        let record = tables
            .drivers
            .entry(driver.clone())
            .or_insert_with(|| DriverRecord::new(driver.clone(), position));
        record.position = position;
        record.profile = profile;
        record.updated_at = Utc::now();
        tracing::debug!(driver = %driver, "Driver registered");
        Ok(record.clone())
    }

    fn get_driver(&self, driver: &DriverId) -> StoreResult<Option<DriverRecord>> {
        self.ensure_online()?;
        Ok(self.read()?.drivers.get(driver).cloned())
    }

    fn query_nearby(
        &self,
        point: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> StoreResult<Vec<NearbyDriver>> {
        self.ensure_online()?;
        let tables = self.read()?;
        Ok(scan_available(&tables.drivers, point, radius_km, limit))
    }

    async fn set_availability(
        &self,
        driver: &DriverId,
        available: bool,
        wait: Duration,
    ) -> StoreResult<DriverRecord> {
        self.ensure_online()?;
        let _row = self.lock_row(driver, wait).await?;

        let mut tables = self.write()?;
        if available && tables.active_rides.contains_key(driver) {
            return Err(StoreError::DriverBusy(driver.clone()));
        }
        let record = tables
            .drivers
            .get_mut(driver)
            .ok_or_else(|| StoreError::DriverNotFound(driver.clone()))?;
        record.available = available;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

impl DispatchStore for MemoryStore {
    type Tx<'s> = MemoryTransaction<'s>;

    fn begin(&self, deadline: Duration) -> StoreResult<MemoryTransaction<'_>> {
        self.ensure_online()?;
        let id = TX_COUNTER.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(tx = id, "Transaction started");
        Ok(MemoryTransaction {
            store: self,
            id,
            started: Instant::now(),
            deadline,
            held: HashMap::new(),
            reserved: Vec::new(),
            rides: Vec::new(),
            finished: false,
        })
    }
}

/// A reservation unit of work over [`MemoryStore`].
///
/// Row locks taken during selection are held until commit, rollback or drop.
/// Nothing staged is visible to other readers before commit.
pub struct MemoryTransaction<'s> {
    store: &'s MemoryStore,
    id: u64,
    started: Instant,
    deadline: Duration,
    held: HashMap<DriverId, OwnedMutexGuard<()>>,
    reserved: Vec<DriverId>,
    rides: Vec<Ride>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Drivers whose row lock this unit of work holds.
    pub fn locked_drivers(&self) -> Vec<DriverId> {
        self.held.keys().cloned().collect()
    }

    fn check_deadline(&self) -> StoreResult<()> {
        if self.started.elapsed() > self.deadline {
            tracing::debug!(tx = self.id, "Transaction deadline exceeded");
            return Err(StoreError::Timeout(self.deadline));
        }
        Ok(())
    }

    fn check_pairing(&self) -> StoreResult<()> {
        if self.rides.iter().any(|r| r.driver_id.is_none()) {
            return Err(StoreError::Inconsistent("ride staged without a driver".into()));
        }
        let ride_drivers: HashSet<&DriverId> =
            self.rides.iter().filter_map(|r| r.driver_id.as_ref()).collect();
        let reserved: HashSet<&DriverId> = self.reserved.iter().collect();
        if ride_drivers != reserved || ride_drivers.len() != self.rides.len() {
            return Err(StoreError::Inconsistent(
                "every reserved driver needs exactly one ride".into(),
            ));
        }
        Ok(())
    }
}

impl UnitOfWork for MemoryTransaction<'_> {
    fn lock_nearest_available(
        &mut self,
        pickup: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> StoreResult<SelectionScan> {
        self.store.ensure_online()?;
        self.check_deadline()?;

        // Locked rows never count against `limit`: a free driver behind a
        // wall of held ones must still be reachable.
        let candidates = {
            let tables = self.store.read()?;
            scan_available(&tables.drivers, pickup, radius_km, usize::MAX)
        };

        let mut skipped_locked = 0;
        let mut examined = 0;
        for candidate in candidates {
            if examined >= limit {
                break;
            }
            let id = candidate.driver.id.clone();
            if self.held.contains_key(&id) {
                continue;
            }
            let Ok(guard) = self.store.row_lock(&id).try_lock_owned() else {
                skipped_locked += 1;
                continue;
            };
            // Availability may have changed between scan and lock.
            let current = self.store.read()?.drivers.get(&id).cloned();
            match current {
                Some(record) if record.available => {
                    self.held.insert(id, guard);
                    return Ok(SelectionScan {
                        chosen: Some(NearbyDriver {
                            driver: record,
                            distance_km: candidate.distance_km,
                        }),
                        skipped_locked,
                    });
                }
                _ => examined += 1,
            }
        }

        Ok(SelectionScan {
            chosen: None,
            skipped_locked,
        })
    }

    fn reserve_driver(&mut self, driver: &DriverId) -> StoreResult<()> {
        self.check_deadline()?;
        if !self.held.contains_key(driver) {
            return Err(StoreError::NotLocked(driver.clone()));
        }
        if !self.reserved.contains(driver) {
            self.reserved.push(driver.clone());
        }
        Ok(())
    }

    fn insert_ride(&mut self, ride: Ride) -> StoreResult<()> {
        self.check_deadline()?;
        self.rides.push(ride);
        Ok(())
    }

    fn commit(mut self) -> StoreResult<()> {
        let store = self.store;
        store.ensure_online()?;
        self.check_deadline()?;
        self.check_pairing()?;

        let mut tables = store.write()?;
        for id in &self.reserved {
            match tables.drivers.get(id) {
                Some(record) if record.available => {}
                Some(_) => return Err(StoreError::DriverBusy(id.clone())),
                None => return Err(StoreError::DriverNotFound(id.clone())),
            }
        }

        let now = Utc::now();
        for id in &self.reserved {
            if let Some(record) = tables.drivers.get_mut(id) {
                record.available = false;
                record.updated_at = now;
            }
        }
        for ride in self.rides.drain(..) {
            if let Some(driver) = &ride.driver_id {
                tables.active_rides.insert(driver.clone(), ride.id);
            }
            tables.rides.insert(ride.id, ride);
        }
        drop(tables);

        self.finished = true;
        tracing::trace!(
            tx = self.id,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Transaction committed"
        );
        Ok(())
    }

    fn rollback(mut self) {
        self.finished = true;
        tracing::trace!(tx = self.id, "Transaction rolled back");
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::trace!(tx = self.id, "Transaction dropped without commit; rolled back");
        }
    }
}

impl RideRecords for MemoryStore {
    fn get_ride(&self, id: RideId) -> StoreResult<Option<Ride>> {
        self.ensure_online()?;
        Ok(self.read()?.rides.get(&id).cloned())
    }

    async fn transition_ride(
        &self,
        id: RideId,
        next: RideStatus,
        strict: bool,
        wait: Duration,
    ) -> StoreResult<Ride> {
        self.ensure_online()?;
        let (current, driver) = {
            let tables = self.read()?;
            let ride = tables.rides.get(&id).ok_or(StoreError::RideNotFound(id))?;
            (ride.status, ride.driver_id.clone())
        };
        if !current.can_transition_to(next, strict) {
            return Err(StoreError::InvalidTransition { from: current, to: next });
        }

        // Releasing a driver touches their row; serialise with selection.
        let _row = match driver {
            Some(ref driver) if next.is_terminal() => Some(self.lock_row(driver, wait).await?),
            _ => None,
        };

        let mut tables = self.write()?;
        let Tables {
            rides,
            drivers,
            active_rides,
            ..
        } = &mut *tables;
        let ride = rides.get_mut(&id).ok_or(StoreError::RideNotFound(id))?;
        if !ride.status.can_transition_to(next, strict) {
            return Err(StoreError::InvalidTransition {
                from: ride.status,
                to: next,
            });
        }

        let now = Utc::now();
        ride.status = next;
        ride.updated_at = now;
        if next.is_terminal() {
            if let Some(driver) = &ride.driver_id {
                if active_rides.get(driver) == Some(&id) {
                    active_rides.remove(driver);
                    if let Some(record) = drivers.get_mut(driver) {
                        record.available = true;
                        record.updated_at = now;
                    }
                }
            }
        }
        Ok(ride.clone())
    }
}

impl PendingStore for MemoryStore {
    fn enqueue_pending(
        &self,
        driver: &DriverId,
        ride: RideId,
        status: RideStatus,
    ) -> StoreResult<PendingNotification> {
        self.ensure_online()?;
        let mut tables = self.write()?;
        let seq = tables.next_seq;
        tables.next_seq += 1;
        let entry = PendingNotification {
            seq,
            driver_id: driver.clone(),
            ride_id: ride,
            status,
            created_at: Utc::now(),
        };
        tables.pending.insert(seq, entry.clone());
        Ok(entry)
    }

    fn pending_for(&self, driver: &DriverId) -> StoreResult<Vec<PendingNotification>> {
        self.ensure_online()?;
        let tables = self.read()?;
        Ok(tables
            .pending
            .values()
            .filter(|p| &p.driver_id == driver)
            .cloned()
            .collect())
    }

    fn remove_pending(&self, seq: u64) -> StoreResult<bool> {
        self.ensure_online()?;
        Ok(self.write()?.pending.remove(&seq).is_some())
    }

    fn pending_count(&self) -> StoreResult<usize> {
        self.ensure_online()?;
        Ok(self.read()?.pending.len())
    }
}
