//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, radius > 0, surge ≥ 1)
//! - Detect duplicate or empty credentials
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::DispatchConfig;

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Finite and not below `min`.
fn at_least(value: f64, min: f64) -> bool {
    value.is_finite() && value >= min
}

/// Check every semantic rule and collect all failures.
pub fn validate_config(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "must be host:port"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }

    let radius = config.matching.search_radius_km;
    if !radius.is_finite() || radius <= 0.0 {
        errors.push(ValidationError::new("matching.search_radius_km", "must be a positive number"));
    }
    if config.matching.candidate_limit == 0 {
        errors.push(ValidationError::new("matching.candidate_limit", "must be >= 1"));
    }

    let pricing = &config.pricing;
    if !at_least(pricing.base_fare, 0.0) {
        errors.push(ValidationError::new("pricing.base_fare", "must be >= 0"));
    }
    if !at_least(pricing.per_km_rate, 0.0) {
        errors.push(ValidationError::new("pricing.per_km_rate", "must be >= 0"));
    }
    if !at_least(pricing.surge_multiplier, 1.0) {
        errors.push(ValidationError::new("pricing.surge_multiplier", "must be >= 1"));
    }
    if !pricing.eta_km_per_unit.is_finite() || pricing.eta_km_per_unit <= 0.0 {
        errors.push(ValidationError::new("pricing.eta_km_per_unit", "must be > 0"));
    }
    for (i, window) in pricing.peak_windows.iter().enumerate() {
        if window.start_hour > 23 || window.end_hour > 23 {
            errors.push(ValidationError::new(
                format!("pricing.peak_windows[{i}]"),
                "hours must be in 0..=23",
            ));
        }
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.request_secs", timeouts.request_secs),
        ("timeouts.transaction_ms", timeouts.transaction_ms),
        ("timeouts.channel_write_ms", timeouts.channel_write_ms),
        ("timeouts.lock_wait_ms", timeouts.lock_wait_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be >= 1"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new("retries.base_delay_ms", "must not exceed max_delay_ms"));
    }

    if config.notifications.channel_buffer == 0 {
        errors.push(ValidationError::new("notifications.channel_buffer", "must be >= 1"));
    }
    if config.storage.snapshot_interval_secs == 0 {
        errors.push(ValidationError::new("storage.snapshot_interval_secs", "must be > 0"));
    }

    let mut seen = HashSet::new();
    for (i, entry) in config.identity.tokens.iter().enumerate() {
        if entry.token.trim().is_empty() {
            errors.push(ValidationError::new(format!("identity.tokens[{i}].token"), "must not be empty"));
        } else if !seen.insert(entry.token.as_str()) {
            errors.push(ValidationError::new(format!("identity.tokens[{i}].token"), "duplicate token"));
        }
        if entry.subject.trim().is_empty() {
            errors.push(ValidationError::new(format!("identity.tokens[{i}].subject"), "must not be empty"));
        }
    }

    if config.rate_limit.enabled
        && (config.rate_limit.requests_per_second == 0 || config.rate_limit.burst_size == 0)
    {
        errors.push(ValidationError::new("rate_limit", "rate and burst must be > 0 when enabled"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "must be host:port"));
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
