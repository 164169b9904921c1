//! Configuration module for llm-layers
//!
//! Loads config from `$XDG_CONFIG_HOME/llm-layers/config.toml` or `~/.config/llm-layers/config.toml`.
//! Falls back to built-in defaults if the file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//! Command line flags take precedence over anything set here.
//!
//! # Example
//!
//! ```no_run
//! use llm_layers::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Default layers: {}", config.generate.layers);
//! println!("Trusted curator: {}", config.registry.trusted_curator);
//! ```

pub mod schema;

pub use schema::{Config, GenerateConfig, LoadoutConfig, RegistryConfig};
