//! Ride Dispatch Engine
//!
//! Matches riders with the nearest free driver, prices the trip, records the
//! ride and pushes the assignment to the driver.
//!
//! # Architecture Overview
//!
//! ```text
//!     Rider                        ┌──────────────────────────────────────────────┐
//!     POST /v1/rides ──────────────┼─▶ http ─▶ identity ─▶ rate limit             │
//!                                  │                         │                    │
//!                                  │                         ▼                    │
//!                                  │   ┌────────────── matching::Dispatcher ───┐  │
//!                                  │   │ selector ─▶ pricing ─▶ ledger ─▶ commit│  │
//!                                  │   └─────────────────┬────────────────────┘  │
//!                                  │                     │ spawned               │
//!                                  │                     ▼                       │
//!     Driver WebSocket ◀───────────┼──────────── notify::DispatchNotifier        │
//!                                  │                     │ fallback              │
//!                                  │                     ▼                       │
//!                                  │   storage::MemoryStore ─▶ JSON snapshots    │
//!                                  │                                             │
//!                                  │   config · observability · lifecycle ·      │
//!                                  │   resilience · admin · net (TLS)            │
//!                                  └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ride_dispatch::config::{load_config, ConfigWatcher, DispatchConfig};
use ride_dispatch::http::HttpServer;
use ride_dispatch::lifecycle::{spawn_signal_handler, Services, Shutdown, StartupError};
use ride_dispatch::net::tls;
use ride_dispatch::observability::{logging, metrics};
use ride_dispatch::storage::snapshot::run_snapshot_task;

#[derive(Parser)]
#[command(name = "ride-dispatch", version, about = "Ride matching and dispatch engine")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "DISPATCH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => DispatchConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ride-dispatch starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        search_radius_km = config.matching.search_radius_km,
        strict_transitions = config.ledger.strict_transitions,
        snapshot = config.storage.snapshot_path.as_deref().unwrap_or("none"),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = Services::build(&config)?;
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    // Hot reload. The watcher must outlive the server.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (rx, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable; hot reload disabled");
                    (mpsc::unbounded_channel().1, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    // Stopped only after the server has drained.
    let snapshot_stop = Shutdown::new();
    let snapshot_task = config.storage.snapshot_path.as_ref().map(|path| {
        tokio::spawn(run_snapshot_task(
            services.store.clone(),
            PathBuf::from(path),
            Duration::from_secs(config.storage.snapshot_interval_secs),
            snapshot_stop.subscribe(),
        ))
    });

    let bind_address = config.listener.bind_address.clone();
    let tls_config = tls::from_listener(config.listener.tls.as_ref())
        .await
        .map_err(StartupError::Tls)?;
    let server = HttpServer::new(config, services);

    match tls_config {
        Some(tls) => {
            let addr = bind_address.parse()?;
            server.run_tls(addr, tls, config_updates, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(&bind_address)
                .await
                .map_err(|source| StartupError::Bind {
                    address: bind_address.clone(),
                    source,
                })?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener, config_updates, shutdown.subscribe()).await?;
        }
    }

    if let Some(task) = snapshot_task {
        snapshot_stop.trigger();
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
