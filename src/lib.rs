//! Scan a photo library and relink stale root folders in a Lightroom
//! catalog.
//!
//! Two passes:
//! - [`scanner`] walks a directory, reads image dimensions and
//!   [`export`] persists the records as JSON, CSV and SQLite;
//! - [`reconcile`] matches [`catalog`] files to the scanned ones by name and
//!   rewrites each stale root folder path, simulated by default.
//!
//! [`audit`] adds read-only reports over the catalog.

pub mod audit;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod logging;
pub mod paths;
pub mod reconcile;
pub mod scanner;

pub use config::Config;
pub use error::RelinkError;
