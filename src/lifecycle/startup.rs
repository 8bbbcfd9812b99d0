//! Startup orchestration.
//!
//! # Responsibilities
//! - Restore the store from its snapshot, if one is configured
//! - Build every dispatch service in dependency order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Services share one store handle; nothing is built lazily

use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::DispatchConfig;
use crate::identity::{IdentityResolver, StaticTokenResolver};
use crate::ledger::RideLedger;
use crate::matching::{Dispatcher, DriverSelector};
use crate::notify::{ChannelRegistry, DispatchNotifier};
use crate::pricing::{Clock, PricingCalculator, SystemClock};
use crate::resilience::RetryPolicy;
use crate::storage::snapshot::open_store;
use crate::storage::{MemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to restore store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load TLS material: {0}")]
    Tls(std::io::Error),
}

/// Everything the transport layer needs, wired once.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<MemoryStore>,
    pub dispatcher: Arc<Dispatcher<MemoryStore>>,
    pub ledger: RideLedger<MemoryStore>,
    pub notifier: DispatchNotifier<MemoryStore>,
    pub pricing: PricingCalculator,
    pub identity: Arc<dyn IdentityResolver>,
}

impl Services {
    /// Restore the snapshot (if any) and build all services.
    pub fn build(config: &DispatchConfig) -> Result<Self, StartupError> {
        let path = config.storage.snapshot_path.as_deref().map(Path::new);
        let store = Arc::new(open_store(path)?);
        Ok(Self::with_store(config, store, Arc::new(SystemClock)))
    }

    /// Build services around an existing store and clock.
    pub fn with_store(config: &DispatchConfig, store: Arc<MemoryStore>, clock: Arc<dyn Clock>) -> Self {
        let timeouts = &config.timeouts;
        let pricing = PricingCalculator::new(Arc::new(ArcSwap::from_pointee(config.pricing.clone())), clock);
        let notifier = DispatchNotifier::new(
            Arc::clone(&store),
            ChannelRegistry::new(),
            timeouts.channel_write(),
            timeouts.lock_wait(),
        );
        let ledger = RideLedger::new(
            Arc::clone(&store),
            config.ledger.strict_transitions,
            timeouts.lock_wait(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            DriverSelector::new(&config.matching),
            pricing.clone(),
            notifier.clone(),
            RetryPolicy::from_config(&config.retries),
            timeouts.transaction(),
        ));
        let identity = StaticTokenResolver::from_config(&config.identity);
        if identity.is_empty() {
            tracing::warn!("No identity tokens configured; every API call will be rejected");
        }

        tracing::info!(
            drivers = store.list_drivers().map(|d| d.len()).unwrap_or(0),
            rides = store.ride_count().unwrap_or(0),
            tokens = identity.len(),
            "Dispatch services initialized"
        );

        Self {
            store,
            dispatcher,
            ledger,
            notifier,
            pricing,
            identity: Arc::new(identity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::GeoPoint;
    use crate::storage::snapshot::persist;
    use crate::storage::DriverDirectory;

    #[test]
    fn builds_without_snapshot() {
        let services = Services::build(&DispatchConfig::default()).unwrap();
        assert_eq!(services.store.ride_count().unwrap(), 0);
        assert!(services.ledger.is_strict());
    }

    #[test]
    fn restores_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let seeded = MemoryStore::new();
        seeded
            .upsert_location(&"d1".into(), GeoPoint::new(0.3135, 32.5811).unwrap())
            .unwrap();
        persist(&seeded, &path).unwrap();

        let mut config = DispatchConfig::default();
        config.storage.snapshot_path = Some(path.to_string_lossy().into_owned());
        let services = Services::build(&config).unwrap();
        assert!(services.store.get_driver(&"d1".into()).unwrap().is_some());
    }
}
