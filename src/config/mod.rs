//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, TimeoutsConfig)
//! - [`listen`]: Downstream listener configuration
//! - [`history`]: Message store configuration
//! - [`limits`]: Queue and line-length limits
//! - [`users`]: Bouncer accounts and their upstream networks
//! - [`validation`]: Startup checks

pub mod defaults;
mod history;
mod limits;
mod listen;
mod types;
mod users;
pub mod validation;

pub use history::{HistoryBackend, HistoryConfig};
pub use limits::LimitsConfig;
pub use listen::ListenConfig;
pub use types::Config;
pub use users::{NetworkConfig, UserConfig};
