//! Small helpers shared by the ingestion and query paths.

pub mod time;

pub use time::{format_ts, parse_ts};
