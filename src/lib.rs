pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::LocalStorage;
pub use config::{HarvestConfig, KaggleBackend};
pub use self::core::bulk::BulkHarvester;
pub use self::core::downloader::Downloader;
pub use self::core::metron_scrape::MetronScraper;
pub use domain::model::DatasetRef;
pub use utils::error::{HarvestError, Result};
