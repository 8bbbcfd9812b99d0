//! Fare and ETA estimation.
//!
//! # Data Flow
//! ```text
//! Dispatcher (Pricing stage)
//!     → PricingCalculator::quote(trip_km, approach_km)
//!         → Clock::local_hour()          peak window check
//!         → calculate_price(cfg, km, h)  base + km × rate, × surge, 2dp
//!         → calculate_eta(cfg, km)       base + ⌈km / km_per_unit⌉
//! ```
//!
//! # Design Decisions
//! - The formulas are free functions over config, distance and hour, so they
//!   are deterministic and tested without a clock
//! - The live `PricingConfig` sits behind `ArcSwap` and is replaced on config
//!   reload without touching in-flight quotes
//! - The wall clock is injected so peak behaviour is testable

pub mod calculator;
pub mod clock;

pub use calculator::{calculate_eta, calculate_price, is_peak_hour, PricingCalculator, Quote};
pub use clock::{Clock, FixedClock, SystemClock};
