//! Failure injection tests for the dispatch engine.

use std::sync::Arc;
use std::time::Duration;

use dispatch_sdk::RideOutcome;
use ride_dispatch::lifecycle::Services;
use ride_dispatch::storage::snapshot::persist;
use ride_dispatch::storage::{DispatchStore, MemoryStore, PendingStore, UnitOfWork};

mod common;

use common::{next_event, rider_token, spawn_server, spawn_server_with_store, test_config, PICKUP};

#[tokio::test]
async fn test_store_outage_is_503_then_recovers() {
    let server = spawn_server(test_config(1, &[])).await;
    server.register_driver("driver1", 0.3140, 32.5811).await;
    let rider = server.client(&rider_token(0));

    server.store().set_online(false);
    let err = rider.request_ride(PICKUP, None).await.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(503));
    assert_eq!(err.code(), Some("store_unavailable"));

    server.store().set_online(true);
    let outcome = rider.request_ride(PICKUP, None).await.unwrap();
    assert!(matches!(outcome, RideOutcome::Assigned(_)));
    server.stop();
}

#[tokio::test]
async fn test_held_driver_surfaces_contention() {
    let store = Arc::new(MemoryStore::new());
    let server = spawn_server_with_store(test_config(1, &[]), Arc::clone(&store)).await;
    server.register_driver("only", 0.3140, 32.5811).await;

    // Another unit of work holds the only candidate for the whole request.
    let pickup = ride_dispatch::location::GeoPoint::new(PICKUP.lat, PICKUP.lng).unwrap();
    let mut holder = store.begin(Duration::from_secs(30)).unwrap();
    let scan = holder.lock_nearest_available(&pickup, 5.0, 10).unwrap();
    assert!(scan.chosen.is_some());

    let err = server.client(&rider_token(0)).request_ride(PICKUP, None).await.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(503));
    assert_eq!(err.code(), Some("selection_contention"));

    holder.rollback();
    let outcome = server.client(&rider_token(0)).request_ride(PICKUP, None).await.unwrap();
    assert_eq!(outcome.assignment().unwrap().driver.id, "only");
    server.stop();
}

#[tokio::test]
async fn test_closed_channel_falls_back_to_pending() {
    let server = spawn_server(test_config(1, &["driver1"])).await;
    server.register_driver("driver1", 0.3140, 32.5811).await;

    let mut socket = server.connect_driver("driver1").await;
    socket.close(None).await.unwrap();
    drop(socket);
    server.wait_disconnected("driver1").await;

    let outcome = server.client(&rider_token(0)).request_ride(PICKUP, None).await.unwrap();
    let ride_id = outcome.assignment().unwrap().ride_id.clone();
    assert!(
        common::wait_until(Duration::from_secs(2), || server.store().pending_count().unwrap() == 1).await,
        "undeliverable assignment was not queued"
    );

    let mut socket = server.connect_driver("driver1").await;
    let event = next_event(&mut socket, Duration::from_secs(2)).await.expect("no replay");
    assert_eq!(event["type"], "pending_ride");
    assert_eq!(event["ride_id"], ride_id.as_str());
    server.stop();
}

#[tokio::test]
async fn test_newer_connection_supersedes_older() {
    let server = spawn_server(test_config(1, &["driver1"])).await;
    server.register_driver("driver1", 0.3140, 32.5811).await;

    let mut first = server.connect_driver("driver1").await;
    let mut second = server.connect_driver("driver1").await;

    // The superseded socket is closed by the server.
    assert!(next_event(&mut first, Duration::from_secs(2)).await.is_none());

    server.client(&rider_token(0)).request_ride(PICKUP, None).await.unwrap();
    let event = next_event(&mut second, Duration::from_secs(2)).await.expect("no event");
    assert_eq!(event["type"], "new_ride");

    drop(first);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.services.notifier.registry().is_connected(&"driver1".into()));
    server.stop();
}

#[tokio::test]
async fn test_rate_limited_rider_gets_429() {
    let mut config = test_config(1, &[]);
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 0;
    config.rate_limit.burst_size = 1;
    let server = spawn_server(config).await;
    let rider = server.client(&rider_token(0));

    assert!(rider.request_ride(PICKUP, None).await.is_ok());
    let err = rider.request_ride(PICKUP, None).await.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(429));
    assert_eq!(err.code(), Some("rate_limited"));
    server.stop();
}

#[tokio::test]
async fn test_pending_notifications_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dispatch.json");

    let server = spawn_server(test_config(1, &["driver1"])).await;
    server.register_driver("driver1", 0.3140, 32.5811).await;
    let outcome = server.client(&rider_token(0)).request_ride(PICKUP, None).await.unwrap();
    let ride_id = outcome.assignment().unwrap().ride_id.clone();
    assert!(
        common::wait_until(Duration::from_secs(2), || server.store().pending_count().unwrap() == 1).await,
        "assignment was not queued"
    );
    persist(server.store(), &path).unwrap();
    server.stop();

    let mut config = test_config(1, &["driver1"]);
    config.storage.snapshot_path = Some(path.to_string_lossy().into_owned());
    let restored = Services::build(&config).unwrap();
    assert_eq!(restored.store.ride_count().unwrap(), 1);
    assert_eq!(restored.store.pending_count().unwrap(), 1);

    let server = spawn_server_with_store(config, Arc::clone(&restored.store)).await;
    let ride = server.client(&rider_token(0)).get_ride(&ride_id).await.unwrap();
    assert_eq!(ride.status, "requested");

    let mut socket = server.connect_driver("driver1").await;
    let event = next_event(&mut socket, Duration::from_secs(2)).await.expect("no replay after restart");
    assert_eq!(event["type"], "pending_ride");
    assert_eq!(event["ride_id"], ride_id.as_str());
    server.stop();
}
