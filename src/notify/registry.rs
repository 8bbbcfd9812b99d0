//! Live channel registry: at most one channel per driver.

use dashmap::DashMap;
use std::sync::Arc;

use crate::location::DriverId;
use crate::notify::connection::{ConnectionId, DriverChannel};

/// Process-wide map of driver → current live channel.
///
/// All mutations for one driver go through a single map shard lock, so
/// register, deregister and lookup are mutually exclusive per key.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<DashMap<DriverId, DriverChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `channel` for `driver`, returning the channel it superseded.
    pub fn register(&self, driver: DriverId, channel: DriverChannel) -> Option<DriverChannel> {
        self.channels.insert(driver, channel)
    }

    /// Remove `driver`'s channel only if it is still connection `id`.
    /// A late close from a superseded connection leaves the newer one alone.
    pub fn deregister(&self, driver: &DriverId, id: ConnectionId) -> bool {
        self.channels
            .remove_if(driver, |_, channel| channel.id() == id)
            .is_some()
    }

    pub fn get(&self, driver: &DriverId) -> Option<DriverChannel> {
        self.channels.get(driver).map(|c| c.value().clone())
    }

    pub fn is_connected(&self, driver: &DriverId) -> bool {
        self.channels.contains_key(driver)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Connected drivers and their connection ids, sorted by driver.
    pub fn connected_drivers(&self) -> Vec<(DriverId, ConnectionId)> {
        let mut drivers: Vec<_> = self
            .channels
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().id()))
            .collect();
        drivers.sort_by(|a, b| a.0.cmp(&b.0));
        drivers
    }
}
