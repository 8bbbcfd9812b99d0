//! Price and ETA formulas.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;

use crate::config::schema::PricingConfig;
use crate::pricing::clock::Clock;

/// Whether `hour` falls inside any configured peak window.
pub fn is_peak_hour(config: &PricingConfig, hour: u32) -> bool {
    config.peak_windows.iter().any(|w| w.contains(hour))
}

/// `(base + km × rate) × surge?`, rounded half away from zero to cents.
pub fn calculate_price(config: &PricingConfig, distance_km: f64, hour: u32) -> f64 {
    let distance_km = distance_km.max(0.0);
    let mut price = config.base_fare + distance_km * config.per_km_rate;
    if is_peak_hour(config, hour) {
        price *= config.surge_multiplier;
    }
    round_cents(price)
}

/// Half away from zero at the cent. The scaled value is first snapped to
/// six decimals so that a decimal half-cent stored as 100.4999… still rounds up.
fn round_cents(amount: f64) -> f64 {
    let cents = (amount * 100.0 * 1e6).round() / 1e6;
    cents.round() / 100.0
}

/// `base + ⌈km / km_per_unit⌉` whole minutes.
pub fn calculate_eta(config: &PricingConfig, distance_km: f64) -> u32 {
    let units = (distance_km.max(0.0) / config.eta_km_per_unit).ceil();
    config.eta_base_minutes.saturating_add(units as u32)
}

/// Price and ETA for one assignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quote {
    pub price: f64,
    pub eta_minutes: u32,
    pub surge_applied: bool,
    /// Distance the price was computed from.
    pub distance_km: f64,
}

/// Quotes against the live pricing config and an injected clock.
#[derive(Clone)]
pub struct PricingCalculator {
    config: Arc<ArcSwap<PricingConfig>>,
    clock: Arc<dyn Clock>,
}

impl PricingCalculator {
    pub fn new(config: Arc<ArcSwap<PricingConfig>>, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Replace the pricing parameters for subsequent quotes.
    pub fn update(&self, config: PricingConfig) {
        self.config.store(Arc::new(config));
        tracing::info!("Pricing configuration updated");
    }

    pub fn current(&self) -> Arc<PricingConfig> {
        self.config.load_full()
    }

    /// Price over `trip_km`; ETA over the driver's `approach_km`.
    pub fn quote(&self, trip_km: f64, approach_km: f64) -> Quote {
        let config = self.config.load();
        let hour = self.clock.local_hour();
        Quote {
            price: calculate_price(&config, trip_km, hour),
            eta_minutes: calculate_eta(&config, approach_km),
            surge_applied: is_peak_hour(&config, hour),
            distance_km: trip_km,
        }
    }
}
