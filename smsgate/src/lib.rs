//! smsgate - signed SMS webhook ingestion service.
//!
//! This library provides the modules behind the `smsgate-web` binary:
//! - `ingest`: signature verification, payload validation and idempotent insert
//! - `store`: SQLite persistence, filtered queries and summary statistics
//! - `web`: axum router and handlers
//!
//! ## Architecture
//!
//! ```text
//! POST /webhook → verify → validate → MessageStore::insert
//! GET /messages, GET /stats → MessageStore (read-only)
//! ```

pub mod config;
pub mod ingest;
pub mod metrics;
pub mod store;
pub mod util;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use ingest::{IngestError, Ingestor, ValidationError};
pub use metrics::Metrics;
pub use store::{
    InsertOutcome, Message, MessageFilter, MessageStore, Page, Pagination, Stats, StoreError,
    StoredMessage,
};
pub use web::{router, AppState};
