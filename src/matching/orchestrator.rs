//! Ride request orchestration: select, price, persist, notify.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::identity::Caller;
use crate::ledger::{NewRide, RideLedger, RideStatus};
use crate::location::GeoPoint;
use crate::matching::selector::{DriverSelector, SelectionError};
use crate::matching::types::{
    AssignedDriver, DispatchError, DispatchResult, DispatchStage, MatchOutcome, RideAssignment,
};
use crate::notify::DispatchNotifier;
use crate::observability::metrics;
use crate::pricing::PricingCalculator;
use crate::resilience::RetryPolicy;
use crate::storage::{DispatchStore, PendingStore, RideRecords, StoreError, UnitOfWork};

/// Outcome of one Selecting → Persisting pass.
enum Attempt {
    Committed(RideAssignment),
    NoDriver { radius_km: f64 },
    Contended,
    Failed(DispatchError),
}

/// Turns ride requests into committed, notified assignments.
pub struct Dispatcher<S> {
    store: Arc<S>,
    selector: DriverSelector,
    pricing: PricingCalculator,
    notifier: DispatchNotifier<S>,
    retry: RetryPolicy,
    tx_deadline: Duration,
}

impl<S> Dispatcher<S>
where
    S: DispatchStore + RideRecords + PendingStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        selector: DriverSelector,
        pricing: PricingCalculator,
        notifier: DispatchNotifier<S>,
        retry: RetryPolicy,
        tx_deadline: Duration,
    ) -> Self {
        Self {
            store,
            selector,
            pricing,
            notifier,
            retry,
            tx_deadline,
        }
    }

    pub fn pricing(&self) -> &PricingCalculator {
        &self.pricing
    }

    pub fn notifier(&self) -> &DispatchNotifier<S> {
        &self.notifier
    }

    /// Match `caller` with the nearest free driver.
    ///
    /// The returned future may be dropped at any await point without side
    /// effects; the reservation itself runs synchronously and is never
    /// interrupted half way.
    pub async fn request_ride(
        &self,
        caller: &Caller,
        pickup: GeoPoint,
        dropoff: Option<GeoPoint>,
    ) -> DispatchResult<MatchOutcome> {
        let started = Instant::now();
        let result = self.run(caller, pickup, dropoff).await;
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) => e.code(),
        };
        metrics::record_ride_request(label, started);
        result
    }

    async fn run(
        &self,
        caller: &Caller,
        pickup: GeoPoint,
        dropoff: Option<GeoPoint>,
    ) -> DispatchResult<MatchOutcome> {
        tracing::debug!(rider = %caller.subject, stage = %DispatchStage::Received, "Ride request received");

        // Authorizing
        if caller.subject.trim().is_empty() {
            return Err(DispatchError::Validation("caller identity is empty".into()));
        }
        let pickup = GeoPoint::new(pickup.lat, pickup.lng)?;
        let dropoff = dropoff.map(|d| GeoPoint::new(d.lat, d.lng)).transpose()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt_reservation(caller, &pickup, dropoff.as_ref()) {
                Attempt::Committed(assignment) => {
                    metrics::record_selection_attempt("reserved");
                    tracing::info!(
                        ride_id = %assignment.ride_id,
                        driver_id = %assignment.driver.id,
                        rider = %caller.subject,
                        attempt,
                        price = assignment.price,
                        eta_minutes = assignment.eta_minutes,
                        "Ride assigned"
                    );
                    self.spawn_notification(&assignment);
                    return Ok(MatchOutcome::Assigned(assignment));
                }
                Attempt::NoDriver { radius_km } => {
                    metrics::record_selection_attempt("no_driver");
                    tracing::info!(rider = %caller.subject, radius_km, "No driver available");
                    return Ok(MatchOutcome::NoDriverAvailable { radius_km });
                }
                Attempt::Contended => {
                    metrics::record_selection_attempt("contention");
                    if !self.retry.allows_retry_after(attempt) {
                        tracing::warn!(rider = %caller.subject, attempt, "Selection contention; giving up");
                        return Err(DispatchError::SelectionContention { attempts: attempt });
                    }
                    let delay = self.retry.delay_after(attempt);
                    tracing::debug!(rider = %caller.subject, attempt, delay = ?delay, "Selection contention; retrying");
                    tokio::time::sleep(delay).await;
                }
                Attempt::Failed(err) => {
                    metrics::record_selection_attempt("error");
                    tracing::error!(rider = %caller.subject, attempt, error = %err, "Ride request failed");
                    return Err(err);
                }
            }
        }
    }

    /// Selecting → Pricing → Persisting in one unit of work.
    fn attempt_reservation(
        &self,
        caller: &Caller,
        pickup: &GeoPoint,
        dropoff: Option<&GeoPoint>,
    ) -> Attempt {
        let mut tx = match self.store.begin(self.tx_deadline) {
            Ok(tx) => tx,
            Err(e) => return classify(e, DispatchStage::Selecting),
        };

        let chosen = match self.selector.select(&mut tx, pickup) {
            Ok(chosen) => chosen,
            Err(e) => {
                tx.rollback();
                return match e {
                    SelectionError::NoDriverAvailable { radius_km } => Attempt::NoDriver { radius_km },
                    SelectionError::Contention { skipped } => {
                        tracing::debug!(skipped, "Candidates locked by concurrent requests");
                        Attempt::Contended
                    }
                    SelectionError::Store(e) => classify(e, DispatchStage::Selecting),
                };
            }
        };

        // Pricing
        let approach_km = chosen.distance_km;
        let trip_km = dropoff.map_or(approach_km, |d| pickup.distance_km(d));
        let quote = self.pricing.quote(trip_km, approach_km);

        // Persisting
        let ride = match RideLedger::<S>::create_ride(
            &mut tx,
            NewRide {
                driver_id: chosen.driver.id.clone(),
                rider_id: caller.subject.clone(),
                pickup: *pickup,
                dropoff: dropoff.copied(),
                price: quote.price,
                eta_minutes: quote.eta_minutes,
            },
        ) {
            Ok(ride) => ride,
            Err(e) => return classify(e, DispatchStage::Persisting),
        };
        if let Err(e) = tx.commit() {
            return classify(e, DispatchStage::Persisting);
        }

        let profile = chosen.driver.profile;
        Attempt::Committed(RideAssignment {
            ride_id: ride.id,
            driver: AssignedDriver {
                id: chosen.driver.id,
                name: profile.name,
                rating: profile.rating,
                vehicle: profile.vehicle,
                position: chosen.driver.position,
                distance_km: approach_km,
            },
            status: ride.status,
            price: ride.price,
            eta_minutes: ride.eta_minutes,
            surge_applied: quote.surge_applied,
            pickup: ride.pickup,
            dropoff: ride.dropoff,
            created_at: ride.created_at,
        })
    }

    /// Notifying runs detached; it cannot fail the committed request.
    fn spawn_notification(&self, assignment: &RideAssignment) {
        let notifier = self.notifier.clone();
        let driver = assignment.driver.id.clone();
        let ride_id = assignment.ride_id;
        tokio::spawn(async move {
            let outcome = notifier.notify(&driver, ride_id, RideStatus::Requested).await;
            tracing::debug!(
                ride_id = %ride_id,
                driver_id = %driver,
                stage = %DispatchStage::Done,
                outcome = outcome.as_str(),
                "Ride request complete"
            );
        });
    }
}

/// Map a store failure at `stage` to an attempt result.
fn classify(err: StoreError, stage: DispatchStage) -> Attempt {
    match err {
        StoreError::Timeout(_) | StoreError::LockTimeout(_) | StoreError::DriverBusy(_) => {
            tracing::debug!(stage = %stage, error = %err, "Transient reservation failure");
            Attempt::Contended
        }
        StoreError::Unavailable(_) => Attempt::Failed(DispatchError::Unavailable(err)),
        other => Attempt::Failed(DispatchError::Persistence(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{MatchingConfig, PricingConfig};
    use crate::location::{DriverId, DriverProfile};
    use crate::notify::ChannelRegistry;
    use crate::pricing::FixedClock;
    use crate::storage::{DriverDirectory, MemoryStore};
    use arc_swap::ArcSwap;
    use std::collections::HashSet;

    fn dispatcher(store: &Arc<MemoryStore>) -> Arc<Dispatcher<MemoryStore>> {
        let pricing = PricingCalculator::new(
            Arc::new(ArcSwap::from_pointee(PricingConfig::default())),
            Arc::new(FixedClock::at_hour(12)),
        );
        let notifier = DispatchNotifier::new(
            Arc::clone(store),
            ChannelRegistry::new(),
            Duration::from_millis(100),
            Duration::from_millis(100),
        );
        Arc::new(Dispatcher::new(
            Arc::clone(store),
            DriverSelector::new(&MatchingConfig::default()),
            pricing,
            notifier,
            RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
            Duration::from_secs(1),
        ))
    }

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng).unwrap()
    }

    #[tokio::test]
    async fn assigns_nearby_driver() {
        let store = Arc::new(MemoryStore::new());
        // ~0.8 km north of the pickup.
        store
            .register_driver(
                &"driver1".into(),
                DriverProfile {
                    name: "Amina".into(),
                    rating: 4.8,
                    vehicle: "Toyota Premio".into(),
                },
                point(0.3207, 32.5811),
            )
            .unwrap();
        let dispatcher = dispatcher(&store);

        let outcome = dispatcher
            .request_ride(&Caller::rider("rider-1"), point(0.3135, 32.5811), None)
            .await
            .unwrap();
        let assignment = outcome.assignment().unwrap();
        assert_eq!(assignment.driver.id.as_str(), "driver1");
        assert_eq!(assignment.driver.name, "Amina");
        assert_eq!(assignment.status, RideStatus::Requested);
        assert!((assignment.driver.distance_km - 0.8).abs() < 0.01);

        let driver = store.get_driver(&"driver1".into()).unwrap().unwrap();
        assert!(!driver.available);
        assert_eq!(store.active_ride(&driver.id).unwrap(), Some(assignment.ride_id));
    }

    #[tokio::test]
    async fn no_driver_leaves_store_untouched() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_location(&"remote".into(), point(1.5, 33.5)).unwrap();
        let dispatcher = dispatcher(&store);

        let outcome = dispatcher
            .request_ride(&Caller::rider("rider-1"), point(0.3135, 32.5811), None)
            .await
            .unwrap();
        assert_eq!(outcome, MatchOutcome::NoDriverAvailable { radius_km: 5.0 });
        assert_eq!(store.ride_count().unwrap(), 0);
        assert!(store.get_driver(&"remote".into()).unwrap().unwrap().available);
    }

    #[tokio::test]
    async fn prices_trip_when_dropoff_given() {
        let store = Arc::new(MemoryStore::new());
        let pickup = point(0.0, 0.0);
        store.upsert_location(&"d1".into(), pickup).unwrap();
        let dispatcher = dispatcher(&store);

        // 4 km along the equator.
        let dropoff = point(0.0, 4.0 / 111.194_926_644_558_73);
        let outcome = dispatcher
            .request_ride(&Caller::rider("rider-1"), pickup, Some(dropoff))
            .await
            .unwrap();
        let assignment = outcome.assignment().unwrap();
        assert_eq!(assignment.price, 11.00);
        assert_eq!(assignment.eta_minutes, 2);
    }

    #[tokio::test]
    async fn contention_exhausts_into_error() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_location(&"only".into(), point(0.3140, 32.5811)).unwrap();
        let dispatcher = dispatcher(&store);

        let mut holder = store.begin(Duration::from_secs(10)).unwrap();
        holder.lock_nearest_available(&point(0.3135, 32.5811), 5.0, 10).unwrap();

        let err = dispatcher
            .request_ride(&Caller::rider("rider-1"), point(0.3135, 32.5811), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::SelectionContention { attempts: 3 }));
        drop(holder);
        assert!(store.get_driver(&"only".into()).unwrap().unwrap().available);
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(&store);
        let bad = GeoPoint { lat: 120.0, lng: 0.0 };
        let err = dispatcher
            .request_ride(&Caller::rider("rider-1"), bad, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));

        let err = dispatcher
            .request_ride(&Caller::rider(" "), point(0.0, 0.0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[tokio::test]
    async fn offline_store_is_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(&store);
        store.set_online(false);
        let err = dispatcher
            .request_ride(&Caller::rider("rider-1"), point(0.0, 0.0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_never_share_a_driver() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..5 {
            store
                .upsert_location(&DriverId::new(format!("d{i}")), point(0.3135 + i as f64 * 0.001, 32.5811))
                .unwrap();
        }
        let dispatcher = dispatcher(&store);

        let mut handles = Vec::new();
        for i in 0..20 {
            let dispatcher = Arc::clone(&dispatcher);
            handles.push(tokio::spawn(async move {
                dispatcher
                    .request_ride(&Caller::rider(format!("rider-{i}")), point(0.3135, 32.5811), None)
                    .await
            }));
        }

        let mut drivers = HashSet::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(MatchOutcome::Assigned(a)) => assert!(drivers.insert(a.driver.id)),
                Ok(MatchOutcome::NoDriverAvailable { .. }) => {}
                Err(DispatchError::SelectionContention { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(drivers.len() <= 5);
        assert_eq!(store.ride_count().unwrap(), drivers.len());
    }
}
