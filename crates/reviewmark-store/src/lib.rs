//! reviewmark-store: Record store backends.
//!
//! Implements the `ReviewStore` trait over a JSON-file directory and over the
//! institution's HTTP/JSON records API, and builds a store from configuration.

pub mod config;
pub mod file;
pub mod http;

pub use config::{create_store, load_config, load_config_from, ReviewmarkConfig, StoreConfig};
pub use file::FileStore;
pub use http::HttpStore;
