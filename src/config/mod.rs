#[cfg(feature = "cli")]
pub mod cli;
pub mod credentials;
pub mod toml_config;

pub use toml_config::{HarvestConfig, KaggleBackend};
