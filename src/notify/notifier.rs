//! Assignment delivery with pending-queue fallback and replay.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ledger::{RideId, RideStatus};
use crate::location::DriverId;
use crate::notify::connection::{ConnectionId, DriverChannel};
use crate::notify::registry::ChannelRegistry;
use crate::notify::types::{NotifyOutcome, PushEvent, ReplayReport};
use crate::observability::metrics;
use crate::storage::PendingStore;

/// Pushes assignment events to drivers.
///
/// Per driver, live delivery and backlog replay run under one delivery lock,
/// so events reach a driver in the order their pending entries were created.
pub struct DispatchNotifier<S> {
    store: Arc<S>,
    registry: ChannelRegistry,
    delivery_locks: Arc<DashMap<DriverId, Arc<Mutex<()>>>>,
    write_timeout: Duration,
    lock_wait: Duration,
}

impl<S> Clone for DispatchNotifier<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
            delivery_locks: Arc::clone(&self.delivery_locks),
            write_timeout: self.write_timeout,
            lock_wait: self.lock_wait,
        }
    }
}

impl<S: PendingStore + 'static> DispatchNotifier<S> {
    pub fn new(
        store: Arc<S>,
        registry: ChannelRegistry,
        write_timeout: Duration,
        lock_wait: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            delivery_locks: Arc::new(DashMap::new()),
            write_timeout,
            lock_wait,
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Deliver a new assignment to `driver`, falling back to the pending
    /// queue. Never fails: the outcome is informational.
    pub async fn notify(&self, driver: &DriverId, ride_id: RideId, status: RideStatus) -> NotifyOutcome {
        let outcome = self.notify_inner(driver, ride_id, status).await;
        metrics::record_notification(outcome.as_str());
        tracing::debug!(
            driver_id = %driver,
            ride_id = %ride_id,
            outcome = outcome.as_str(),
            "Notification processed"
        );
        outcome
    }

    async fn notify_inner(&self, driver: &DriverId, ride_id: RideId, status: RideStatus) -> NotifyOutcome {
        let Some(_delivery) = self.lock_delivery(driver).await else {
            tracing::warn!(driver_id = %driver, ride_id = %ride_id, "Delivery lock busy; queueing");
            let outcome = self.queue(driver, ride_id, status);
            if outcome == NotifyOutcome::Queued {
                self.schedule_drain(driver);
            }
            return outcome;
        };

        let backlog = match self.store.pending_for(driver) {
            Ok(pending) => !pending.is_empty(),
            Err(e) => {
                tracing::warn!(driver_id = %driver, error = %e, "Could not read pending queue");
                false
            }
        };

        if backlog {
            // Older events go first: queue behind them and drain.
            let outcome = self.queue(driver, ride_id, status);
            if outcome == NotifyOutcome::Queued {
                if let Some(channel) = self.registry.get(driver) {
                    let report = self.drain(driver, &channel).await;
                    if report.remaining == 0 {
                        return NotifyOutcome::Delivered;
                    }
                }
            }
            return outcome;
        }

        let Some(channel) = self.registry.get(driver) else {
            return self.queue(driver, ride_id, status);
        };
        match channel.deliver(PushEvent::new_ride(ride_id), self.write_timeout).await {
            Ok(()) => NotifyOutcome::Delivered,
            Err(e) => {
                tracing::warn!(
                    driver_id = %driver,
                    ride_id = %ride_id,
                    connection_id = %channel.id(),
                    error = %e,
                    "Live delivery failed; queueing"
                );
                self.queue(driver, ride_id, status)
            }
        }
    }

    /// Register a newly opened channel for `driver` and replay its backlog.
    pub async fn connect(&self, driver: &DriverId, channel: DriverChannel) -> ReplayReport {
        if let Some(previous) = self.registry.register(driver.clone(), channel.clone()) {
            tracing::info!(
                driver_id = %driver,
                superseded = %previous.id(),
                connection_id = %channel.id(),
                "Driver channel superseded"
            );
        }
        metrics::set_connected_drivers(self.registry.len());

        let Some(_delivery) = self.lock_delivery(driver).await else {
            tracing::warn!(driver_id = %driver, "Delivery lock busy; replay deferred");
            return ReplayReport::default();
        };
        let report = self.drain(driver, &channel).await;
        if report.delivered > 0 || report.remaining > 0 {
            tracing::info!(
                driver_id = %driver,
                connection_id = %channel.id(),
                delivered = report.delivered,
                remaining = report.remaining,
                "Pending notifications replayed"
            );
        }
        report
    }

    /// Drop `driver`'s registration if it still belongs to connection `id`.
    pub fn disconnect(&self, driver: &DriverId, id: ConnectionId) -> bool {
        let removed = self.registry.deregister(driver, id);
        if removed {
            metrics::set_connected_drivers(self.registry.len());
            tracing::info!(driver_id = %driver, connection_id = %id, "Driver channel deregistered");
        } else {
            tracing::debug!(driver_id = %driver, connection_id = %id, "Stale channel close ignored");
        }
        removed
    }

    /// Deliver queued events in creation order; stop at the first failure.
    ///
    /// The queue is re-read until it comes back empty, so entries queued by a
    /// `notify` that could not take the delivery lock are not left behind.
    async fn drain(&self, driver: &DriverId, channel: &DriverChannel) -> ReplayReport {
        let mut sent = HashSet::new();
        let mut report = ReplayReport::default();
        loop {
            let pending = match self.store.pending_for(driver) {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::warn!(driver_id = %driver, error = %e, "Could not read pending queue");
                    break;
                }
            };
            // Entries whose removal failed come back; never resend them here.
            let fresh: Vec<_> = pending.into_iter().filter(|p| !sent.contains(&p.seq)).collect();
            if fresh.is_empty() {
                break;
            }

            let total = fresh.len();
            let mut batch = 0;
            for entry in fresh {
                let event = PushEvent::pending_ride(entry.ride_id);
                if let Err(e) = channel.deliver(event, self.write_timeout).await {
                    tracing::warn!(
                        driver_id = %driver,
                        ride_id = %entry.ride_id,
                        error = %e,
                        "Replay interrupted"
                    );
                    break;
                }
                // A failed removal means a duplicate on the next replay, never a loss.
                if let Err(e) = self.store.remove_pending(entry.seq) {
                    tracing::warn!(seq = entry.seq, error = %e, "Could not remove replayed entry");
                }
                sent.insert(entry.seq);
                batch += 1;
            }
            report.delivered += batch;
            if batch < total {
                report.remaining = total - batch;
                break;
            }
        }

        metrics::record_pending_replayed(report.delivered);
        self.refresh_pending_gauge();
        report
    }

    /// Replay `driver`'s queue in the background once the current holder of
    /// its delivery lock is done. No-op without a live channel.
    fn schedule_drain(&self, driver: &DriverId) {
        if !self.registry.is_connected(driver) {
            return;
        }
        let notifier = self.clone();
        let driver = driver.clone();
        tokio::spawn(async move {
            let lock = notifier.delivery_lock(&driver);
            let _delivery = lock.lock_owned().await;
            let Some(channel) = notifier.registry.get(&driver) else {
                return;
            };
            let report = notifier.drain(&driver, &channel).await;
            tracing::debug!(
                driver_id = %driver,
                delivered = report.delivered,
                remaining = report.remaining,
                "Deferred replay finished"
            );
        });
    }

    fn queue(&self, driver: &DriverId, ride_id: RideId, status: RideStatus) -> NotifyOutcome {
        match self.store.enqueue_pending(driver, ride_id, status) {
            Ok(entry) => {
                tracing::debug!(driver_id = %driver, ride_id = %ride_id, seq = entry.seq, "Notification queued");
                self.refresh_pending_gauge();
                NotifyOutcome::Queued
            }
            Err(e) => {
                tracing::error!(
                    driver_id = %driver,
                    ride_id = %ride_id,
                    error = %e,
                    "Failed to persist pending notification"
                );
                NotifyOutcome::Dropped
            }
        }
    }

    fn delivery_lock(&self, driver: &DriverId) -> Arc<Mutex<()>> {
        self.delivery_locks.entry(driver.clone()).or_default().clone()
    }

    async fn lock_delivery(&self, driver: &DriverId) -> Option<OwnedMutexGuard<()>> {
        let lock = self.delivery_lock(driver);
        tokio::time::timeout(self.lock_wait, lock.lock_owned()).await.ok()
    }

    fn refresh_pending_gauge(&self) {
        if let Ok(count) = self.store.pending_count() {
            metrics::set_pending_notifications(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::connection::{channel, ChannelReceiver};
    use crate::notify::types::EventKind;
    use crate::storage::MemoryStore;

    fn notifier(store: &Arc<MemoryStore>) -> DispatchNotifier<MemoryStore> {
        DispatchNotifier::new(
            Arc::clone(store),
            ChannelRegistry::new(),
            Duration::from_millis(200),
            Duration::from_millis(200),
        )
    }

    /// Writer that acknowledges every event and forwards it to the test.
    fn spawn_writer(mut rx: ChannelReceiver) -> tokio::sync::mpsc::UnboundedReceiver<PushEvent> {
        let (seen_tx, seen_rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                let _ = seen_tx.send(write.event().clone());
                write.complete(Ok(()));
            }
        });
        seen_rx
    }

    #[tokio::test]
    async fn delivers_live_when_connected() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier(&store);
        let driver = DriverId::from("d1");
        let (tx, rx) = channel(ConnectionId::new(), 8);
        let mut seen = spawn_writer(rx);
        notifier.connect(&driver, tx).await;

        let ride = RideId::new();
        let outcome = notifier.notify(&driver, ride, RideStatus::Requested).await;
        assert_eq!(outcome, NotifyOutcome::Delivered);
        let event = seen.recv().await.unwrap();
        assert_eq!((event.kind, event.ride_id), (EventKind::NewRide, ride));
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn queues_when_offline_and_replays_in_order() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier(&store);
        let driver = DriverId::from("d1");
        let rides = [RideId::new(), RideId::new(), RideId::new()];
        for ride in rides {
            let outcome = notifier.notify(&driver, ride, RideStatus::Requested).await;
            assert_eq!(outcome, NotifyOutcome::Queued);
        }

        let (tx, rx) = channel(ConnectionId::new(), 8);
        let mut seen = spawn_writer(rx);
        let report = notifier.connect(&driver, tx).await;
        assert_eq!(report, ReplayReport { delivered: 3, remaining: 0 });

        for ride in rides {
            let event = seen.recv().await.unwrap();
            assert_eq!((event.kind, event.ride_id), (EventKind::PendingRide, ride));
        }
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_channel_falls_back_to_queue() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier(&store);
        let driver = DriverId::from("d1");
        let (tx, rx) = channel(ConnectionId::new(), 8);
        notifier.registry().register(driver.clone(), tx);
        drop(rx);

        let outcome = notifier.notify(&driver, RideId::new(), RideStatus::Requested).await;
        assert_eq!(outcome, NotifyOutcome::Queued);
        assert_eq!(store.pending_for(&driver).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_replay_keeps_remaining_entries() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier(&store);
        let driver = DriverId::from("d1");
        for _ in 0..3 {
            notifier.notify(&driver, RideId::new(), RideStatus::Requested).await;
        }

        // Writer acknowledges one event, then fails.
        let (tx, mut rx) = channel(ConnectionId::new(), 8);
        tokio::spawn(async move {
            if let Some(write) = rx.recv().await {
                write.complete(Ok(()));
            }
            if let Some(write) = rx.recv().await {
                write.complete(Err(crate::notify::ChannelError::Write("broken pipe".into())));
            }
        });
        let report = notifier.connect(&driver, tx).await;
        assert_eq!(report, ReplayReport { delivered: 1, remaining: 2 });
        assert_eq!(store.pending_for(&driver).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn backlog_keeps_fifo_for_new_events() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier(&store);
        let driver = DriverId::from("d1");
        let older = RideId::new();
        store.enqueue_pending(&driver, older, RideStatus::Requested).unwrap();

        let (tx, rx) = channel(ConnectionId::new(), 8);
        let mut seen = spawn_writer(rx);
        notifier.registry().register(driver.clone(), tx);

        let newer = RideId::new();
        let outcome = notifier.notify(&driver, newer, RideStatus::Requested).await;
        assert_eq!(outcome, NotifyOutcome::Delivered);
        assert_eq!(seen.recv().await.unwrap().ride_id, older);
        assert_eq!(seen.recv().await.unwrap().ride_id, newer);
    }

    #[tokio::test]
    async fn event_queued_during_replay_reaches_live_channel() {
        let store = Arc::new(MemoryStore::new());
        let notifier = DispatchNotifier::new(
            Arc::clone(&store),
            ChannelRegistry::new(),
            Duration::from_millis(500),
            Duration::from_millis(100),
        );
        let driver = DriverId::from("d1");
        let backlog = [RideId::new(), RideId::new(), RideId::new()];
        for ride in backlog {
            store.enqueue_pending(&driver, ride, RideStatus::Requested).unwrap();
        }

        // Slow writer: replaying the backlog outlasts the notifier's lock wait.
        let (tx, mut rx) = channel(ConnectionId::new(), 8);
        let (seen_tx, mut seen) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                tokio::time::sleep(Duration::from_millis(150)).await;
                let _ = seen_tx.send(write.event().clone());
                write.complete(Ok(()));
            }
        });

        let connecting = {
            let notifier = notifier.clone();
            let driver = driver.clone();
            tokio::spawn(async move { notifier.connect(&driver, tx).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let newer = RideId::new();
        let outcome = notifier.notify(&driver, newer, RideStatus::Requested).await;
        assert_eq!(outcome, NotifyOutcome::Queued);
        let report = connecting.await.unwrap();
        assert_eq!(report, ReplayReport { delivered: 4, remaining: 0 });

        for ride in backlog.into_iter().chain([newer]) {
            let event = tokio::time::timeout(Duration::from_secs(2), seen.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.ride_id, ride);
        }
        assert!(notifier.registry().is_connected(&driver));
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn busy_lock_schedules_replay_for_connected_driver() {
        let store = Arc::new(MemoryStore::new());
        let notifier = DispatchNotifier::new(
            Arc::clone(&store),
            ChannelRegistry::new(),
            Duration::from_millis(200),
            Duration::from_millis(50),
        );
        let driver = DriverId::from("d1");
        let (tx, rx) = channel(ConnectionId::new(), 8);
        let mut seen = spawn_writer(rx);
        notifier.registry().register(driver.clone(), tx);

        // Hold the delivery lock past the notifier's wait, then let go.
        let held = notifier.delivery_lock(&driver).lock_owned().await;
        let ride = RideId::new();
        let outcome = notifier.notify(&driver, ride, RideStatus::Requested).await;
        assert_eq!(outcome, NotifyOutcome::Queued);
        drop(held);

        let event = tokio::time::timeout(Duration::from_secs(2), seen.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((event.kind, event.ride_id), (EventKind::PendingRide, ride));
    }

    #[tokio::test]
    async fn store_outage_drops_without_failing() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier(&store);
        store.set_online(false);
        let outcome = notifier.notify(&"d1".into(), RideId::new(), RideStatus::Requested).await;
        assert_eq!(outcome, NotifyOutcome::Dropped);
    }

    #[tokio::test]
    async fn stale_disconnect_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier(&store);
        let driver = DriverId::from("d1");
        let (old, _old_rx) = channel(ConnectionId::new(), 1);
        let (new, _new_rx) = channel(ConnectionId::new(), 1);
        notifier.connect(&driver, old.clone()).await;
        notifier.connect(&driver, new.clone()).await;

        assert!(!notifier.disconnect(&driver, old.id()));
        assert!(notifier.registry().is_connected(&driver));
        assert!(notifier.disconnect(&driver, new.id()));
    }
}
