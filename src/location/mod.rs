//! Driver positions and geographic primitives.
//!
//! # Data Flow
//! ```text
//! driver app ── PUT /v1/drivers/location ──▶ GeoPoint::new (validate)
//!     → storage (DriverDirectory::upsert_location)
//!     → DriverRecord { position, available, profile }
//!
//! ride request ──▶ DriverDirectory::query_nearby / UnitOfWork scan
//!     → haversine distance, ascending, ties by driver id
//! ```
//!
//! # Design Decisions
//! - Coordinates are validated once at construction; a `GeoPoint` is always valid
//! - Linear scan over drivers; no spatial index (city-scale pools)
//! - Availability is owned by the store, never by location updates

pub mod geo;
pub mod types;

pub use geo::{haversine_km, GeoError, GeoPoint};
pub use types::{DriverId, DriverProfile, DriverRecord, NearbyDriver};
