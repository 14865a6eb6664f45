//! Thread Archive Importer Library
//!
//! Extracts structured thread records from saved forum pages, overlays the
//! metadata feed, and upserts them into a normalized SQLite store.

pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod feed;
pub mod importer;
pub mod merger;
pub mod record;
pub mod resolver;
pub mod segmenter;
pub mod snapshots;

pub use config::Config;
pub use db::Database;
pub use error::{ImportError, Result};
pub use extractor::extract_thread;
pub use feed::{MetadataFeed, MetadataRecord};
pub use importer::{ImportStats, Importer};
pub use merger::MergeOutcome;
pub use record::ThreadRecord;
pub use snapshots::Snapshot;
