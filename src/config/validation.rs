//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use std::collections::HashSet;

use thiserror::Error;

use super::Config;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("user with empty username")]
    EmptyUsername,
    #[error("duplicate username {0:?}")]
    DuplicateUsername(String),
    #[error("duplicate network id {0}")]
    DuplicateNetworkId(i64),
    #[error("network name {0:?} must not be empty or contain '/' or spaces")]
    InvalidNetworkName(String),
    #[error("limits.outbound_queue must be greater than zero")]
    ZeroQueue,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }
    if config.limits.outbound_queue == 0 {
        errors.push(ValidationError::ZeroQueue);
    }

    let mut usernames = HashSet::new();
    let mut network_ids = HashSet::new();
    for user in &config.users {
        if user.username.is_empty() {
            errors.push(ValidationError::EmptyUsername);
        } else if !usernames.insert(user.username.as_str()) {
            errors.push(ValidationError::DuplicateUsername(user.username.clone()));
        }

        for network in &user.networks {
            if !network_ids.insert(network.id) {
                errors.push(ValidationError::DuplicateNetworkId(network.id));
            }
            if network.name.is_empty() || network.name.contains(['/', ' ']) {
                errors.push(ValidationError::InvalidNetworkName(network.name.clone()));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
