//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use dispatch_sdk::{Coordinates, DispatchClient};
use ride_dispatch::config::schema::TokenConfig;
use ride_dispatch::config::DispatchConfig;
use ride_dispatch::http::HttpServer;
use ride_dispatch::identity::Role;
use ride_dispatch::lifecycle::{Services, Shutdown};
use ride_dispatch::pricing::FixedClock;
use ride_dispatch::storage::MemoryStore;

pub const ADMIN_KEY: &str = "test-admin-key";

/// Kampala city centre; the pickup used throughout the scenarios.
pub const PICKUP: Coordinates = Coordinates { lat: 0.3135, lng: 32.5811 };

pub type DriverSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn rider_token(n: usize) -> String {
    format!("rider-token-{n}")
}

pub fn driver_token(id: &str) -> String {
    format!("{id}-token")
}

/// Defaults plus `riders` rider tokens, one token per driver id, and an
/// enabled admin API.
pub fn test_config(riders: usize, drivers: &[&str]) -> DispatchConfig {
    let mut config = DispatchConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.observability.metrics_enabled = false;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.into();
    config.timeouts.channel_write_ms = 500;
    for n in 0..riders {
        config.identity.tokens.push(TokenConfig {
            token: rider_token(n),
            subject: format!("rider-{n}"),
            role: Role::Rider,
        });
    }
    for id in drivers {
        config.identity.tokens.push(TokenConfig {
            token: driver_token(id),
            subject: id.to_string(),
            role: Role::Driver,
        });
    }
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub services: Services,
    pub shutdown: Shutdown,
}

impl TestServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self, token: &str) -> DispatchClient {
        DispatchClient::new(&self.base_url()).with_token(token)
    }

    pub fn admin(&self) -> DispatchClient {
        DispatchClient::new(&self.base_url())
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.services.store
    }

    pub async fn register_driver(&self, id: &str, lat: f64, lng: f64) {
        self.admin()
            .register_driver(ADMIN_KEY, id, &format!("Driver {id}"), "Toyota Premio", 4.8, Coordinates { lat, lng })
            .await
            .expect("driver registration failed");
    }

    /// Open `driver`'s channel and wait until the server has registered it.
    pub async fn connect_driver(&self, driver: &str) -> DriverSocket {
        let registry = self.services.notifier.registry();
        let id = driver.into();
        let before = registry.get(&id).map(|c| c.id());
        let url = format!("ws://{}/v1/drivers/ws?token={}", self.addr, driver_token(driver));
        let (socket, _) = connect_async(url.as_str()).await.expect("websocket connect failed");
        let registered = wait_until(Duration::from_secs(2), || {
            let current = registry.get(&id).map(|c| c.id());
            current.is_some() && current != before
        })
        .await;
        assert!(registered, "driver channel for {driver} never registered");
        socket
    }

    /// Wait until `driver` has no registered channel.
    pub async fn wait_disconnected(&self, driver: &str) {
        let gone = wait_until(Duration::from_secs(2), || {
            !self.services.notifier.registry().is_connected(&driver.into())
        })
        .await;
        assert!(gone, "driver channel for {driver} still registered");
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

/// Start a server on an ephemeral port, priced at a fixed off-peak hour.
pub async fn spawn_server(config: DispatchConfig) -> TestServer {
    spawn_server_with_store(config, Arc::new(MemoryStore::new())).await
}

pub async fn spawn_server_with_store(config: DispatchConfig, store: Arc<MemoryStore>) -> TestServer {
    let services = Services::with_store(&config, store, Arc::new(FixedClock::at_hour(12)));
    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, services.clone());
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    TestServer {
        addr,
        services,
        shutdown,
    }
}

/// Poll `check` every 10ms until it holds or `limit` passes.
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Next JSON text frame, or `None` on timeout or close.
pub async fn next_event(socket: &mut DriverSocket, limit: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let frame = tokio::time::timeout_at(deadline, socket.next()).await.ok()??;
        match frame {
            Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

pub async fn send_json(socket: &mut DriverSocket, value: Value) {
    socket
        .send(Message::text(value.to_string()))
        .await
        .expect("websocket send failed");
}

/// Poll the ride until it reports `status`.
pub async fn wait_for_status(client: &DispatchClient, ride_id: &str, status: &str) -> bool {
    for _ in 0..100 {
        if let Ok(ride) = client.get_ride(ride_id).await {
            if ride.status == status {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
