//! Row and result types for the message store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::StoreError;
use crate::util::parse_ts;

/// A validated message ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: String,
    pub from_msisdn: String,
    pub to_msisdn: String,
    pub ts: DateTime<Utc>,
    pub text: Option<String>,
}

/// A message as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub message_id: String,
    pub from_msisdn: String,
    pub to_msisdn: String,
    pub ts: DateTime<Utc>,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Created,
    /// A row with the same `message_id` already existed
    Duplicate,
}

impl InsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertOutcome::Created => "created",
            InsertOutcome::Duplicate => "duplicate",
        }
    }
}

/// Raw row shape as stored in SQLite.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MessageRow {
    pub message_id: String,
    pub from_msisdn: String,
    pub to_msisdn: String,
    pub ts: String,
    pub text: Option<String>,
    pub created_at: String,
}

impl TryFrom<MessageRow> for StoredMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let ts = parse_ts(&row.ts).ok_or_else(|| StoreError::CorruptRow {
            message_id: row.message_id.clone(),
            reason: format!("unparseable ts {:?}", row.ts),
        })?;
        let created_at = parse_ts(&row.created_at).ok_or_else(|| StoreError::CorruptRow {
            message_id: row.message_id.clone(),
            reason: format!("unparseable created_at {:?}", row.created_at),
        })?;

        Ok(StoredMessage {
            message_id: row.message_id,
            from_msisdn: row.from_msisdn,
            to_msisdn: row.to_msisdn,
            ts,
            text: row.text,
            created_at,
        })
    }
}

/// One page of query results.
#[derive(Debug, Clone)]
pub struct Page {
    pub rows: Vec<StoredMessage>,
    /// Rows matching the filters before pagination
    pub total: u64,
}

/// Message count for a single sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderCount {
    #[serde(rename = "from")]
    pub from_msisdn: String,
    pub count: u64,
}

/// Summary statistics over the whole store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_messages: u64,
    /// Distinct senders across the whole store, not only the top list
    pub senders_count: u64,
    pub messages_per_sender: Vec<SenderCount>,
    pub first_message_ts: Option<DateTime<Utc>>,
    pub last_message_ts: Option<DateTime<Utc>>,
}
