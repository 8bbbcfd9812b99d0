//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatch
//! service. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::identity::Role;

/// Root configuration for the dispatch service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatchConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Driver search settings.
    pub matching: MatchingConfig,

    /// Fare and ETA parameters. Hot-reloadable.
    pub pricing: PricingConfig,

    /// Ride lifecycle settings.
    pub ledger: LedgerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Contention retry configuration.
    pub retries: RetryConfig,

    /// Driver channel settings.
    pub notifications: NotificationConfig,

    /// Snapshot persistence.
    pub storage: StorageConfig,

    /// Static credentials for riders and drivers.
    pub identity: IdentityConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Driver search configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Search radius around the pickup point in kilometres.
    pub search_radius_km: f64,

    /// Maximum unlocked candidates examined per selection attempt. Drivers
    /// held by other requests are skipped without counting.
    pub candidate_limit: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            search_radius_km: 5.0,
            candidate_limit: 10,
        }
    }
}

/// Fare and ETA parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Flat fare added to every ride.
    pub base_fare: f64,

    /// Fare per kilometre.
    pub per_km_rate: f64,

    /// Multiplier applied inside peak windows.
    pub surge_multiplier: f64,

    /// Peak hours in server local time.
    pub peak_windows: Vec<PeakWindow>,

    /// Fixed minutes added to every ETA.
    pub eta_base_minutes: u32,

    /// Kilometres covered per ETA minute.
    pub eta_km_per_unit: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_fare: 5.0,
            per_km_rate: 1.5,
            surge_multiplier: 1.2,
            peak_windows: vec![
                PeakWindow { start_hour: 7, end_hour: 9 },
                PeakWindow { start_hour: 17, end_hour: 19 },
            ],
            eta_base_minutes: 2,
            eta_km_per_unit: 0.5,
        }
    }
}

/// Inclusive range of local hours, e.g. 7..=9 covers 07:00 to 09:59.
/// A window whose start is after its end wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PeakWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl PeakWindow {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..=self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour <= self.end_hour
        }
    }
}

/// Ride lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Require single forward steps (no accepted → completed).
    pub strict_transitions: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            strict_transitions: true,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Deadline for one reservation transaction in milliseconds.
    pub transaction_ms: u64,

    /// Maximum time for a single write to a driver channel in milliseconds.
    pub channel_write_ms: u64,

    /// Maximum wait for a driver row lock outside selection in milliseconds.
    pub lock_wait_ms: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn transaction(&self) -> Duration {
        Duration::from_millis(self.transaction_ms)
    }

    pub fn channel_write(&self) -> Duration {
        Duration::from_millis(self.channel_write_ms)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            transaction_ms: 2000,
            channel_write_ms: 2000,
            lock_wait_ms: 500,
        }
    }
}

/// Retry configuration for selection contention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 20,
            max_delay_ms: 200,
        }
    }
}

/// Driver channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Outbound events buffered per driver connection.
    pub channel_buffer: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { channel_buffer: 64 }
    }
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot file. Without one the store is purely in memory.
    pub snapshot_path: Option<String>,

    /// Seconds between periodic snapshots.
    pub snapshot_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            snapshot_interval_secs: 30,
        }
    }
}

/// Static credential table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub tokens: Vec<TokenConfig>,
}

/// One bearer token and the caller it resolves to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenConfig {
    pub token: String,
    /// Rider id or driver id.
    pub subject: String,
    pub role: Role,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Ride requests per second per caller.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 5,
            burst_size: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the `/admin` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
