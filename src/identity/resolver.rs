//! Credential → caller resolution.

use std::collections::HashMap;

use crate::config::schema::IdentityConfig;
use crate::identity::types::{Caller, IdentityError};

/// Resolves a raw credential to a caller.
pub trait IdentityResolver: Send + Sync {
    fn resolve_caller(&self, credential: &str) -> Result<Caller, IdentityError>;
}

/// Resolver backed by the configured token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, Caller>,
}

impl StaticTokenResolver {
    pub fn from_config(config: &IdentityConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|t| {
                (
                    t.token.clone(),
                    Caller {
                        subject: t.subject.clone(),
                        role: t.role,
                    },
                )
            })
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityResolver for StaticTokenResolver {
    fn resolve_caller(&self, credential: &str) -> Result<Caller, IdentityError> {
        if credential.is_empty() {
            return Err(IdentityError::MissingCredential);
        }
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(IdentityError::InvalidCredential)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TokenConfig;
    use crate::identity::Role;

    fn resolver() -> StaticTokenResolver {
        StaticTokenResolver::from_config(&IdentityConfig {
            tokens: vec![
                TokenConfig {
                    token: "rider-token".into(),
                    subject: "rider-1".into(),
                    role: Role::Rider,
                },
                TokenConfig {
                    token: "driver-token".into(),
                    subject: "driver1".into(),
                    role: Role::Driver,
                },
            ],
        })
    }

    #[test]
    fn resolves_known_tokens() {
        let r = resolver();
        assert_eq!(r.resolve_caller("rider-token").unwrap(), Caller::rider("rider-1"));
        let driver = r.resolve_caller("driver-token").unwrap();
        assert_eq!(driver.driver_id().unwrap().as_str(), "driver1");
        assert!(Caller::rider("rider-1").driver_id().is_none());
    }

    #[test]
    fn rejects_unknown_or_empty() {
        let r = resolver();
        assert_eq!(r.resolve_caller("nope"), Err(IdentityError::InvalidCredential));
        assert_eq!(r.resolve_caller(""), Err(IdentityError::MissingCredential));
    }

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }
}
