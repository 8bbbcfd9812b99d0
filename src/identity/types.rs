//! Identity types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::DriverId;

/// What a caller is allowed to act as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Rider,
    Driver,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Rider => f.write_str("rider"),
            Role::Driver => f.write_str("driver"),
        }
    }
}

/// A resolved caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub subject: String,
    pub role: Role,
}

impl Caller {
    pub fn rider(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            role: Role::Rider,
        }
    }

    pub fn driver(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            role: Role::Driver,
        }
    }

    /// The caller's driver identity, if they are a driver.
    pub fn driver_id(&self) -> Option<DriverId> {
        (self.role == Role::Driver).then(|| DriverId::new(self.subject.clone()))
    }
}

/// Identity resolution failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentityError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid credential")]
    InvalidCredential,

    #[error("caller must be a {0}")]
    WrongRole(Role),
}
