// Adapters layer: concrete implementations for external systems (filesystem, Kaggle, Metron).

pub mod cache;
pub mod http;
pub mod kaggle_api;
pub mod kaggle_cli;
pub mod metron;
pub mod storage;

pub use storage::LocalStorage;
