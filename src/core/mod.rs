pub mod analysis;
pub mod bulk;
pub mod downloader;
pub mod entity;
pub mod links;
pub mod metron_scrape;
pub mod summary;

pub use crate::domain::model::{DatasetRef, DatasetStats};
pub use crate::domain::ports::{DatasetSource, Storage};
pub use crate::utils::error::Result;
