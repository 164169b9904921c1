pub mod app;
pub mod config;
pub mod error;
pub mod hardware;
pub mod inventory;
pub mod ledger;
pub mod loadout;
pub mod models;
pub mod registry;
pub mod script;

pub use error::{LayersError, RegistryError, Result};
