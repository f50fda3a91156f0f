//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, BotConfig, DispatchConfig)
//! - [`defaults`]: Default value functions for serde
//! - [`validation`]: Startup validation of loaded configuration

mod defaults;
mod types;
mod validation;

pub use types::{
    BotConfig, Config, ConfigError, DatabaseConfig, DispatchConfig, RoomsConfig, ServerConfig,
};
pub use validation::{ValidationError, validate};
