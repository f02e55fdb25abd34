//! Filtered, paginated reads over stored messages.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;

use super::types::{MessageRow, Page, StoredMessage};
use super::{MessageStore, StoreError};
use crate::util::{format_ts, parse_ts};

/// Page size used when the caller does not pass `limit`.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Rejected query parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("limit must be between 1 and 100, got {0}")]
    InvalidLimit(i64),

    #[error("offset must be non-negative, got {0}")]
    InvalidOffset(i64),

    #[error("{param} is not a valid date-time: {value:?}")]
    InvalidTimestamp { param: &'static str, value: String },
}

/// Validated pagination window. Out-of-range values are rejected, not clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    limit: i64,
    offset: i64,
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Result<Self, QueryError> {
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(QueryError::InvalidLimit(limit));
        }
        if offset < 0 {
            return Err(QueryError::InvalidOffset(offset));
        }
        Ok(Self { limit, offset })
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// Conjunctive filters. `None` imposes no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    pub from_msisdn: Option<String>,
    pub to_msisdn: Option<String>,
    /// Inclusive lower bound on `ts`
    pub start_ts: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `ts`
    pub end_ts: Option<DateTime<Utc>>,
}

impl MessageFilter {
    /// Build a filter from raw request parameters. Empty strings count as absent.
    pub fn from_params(
        from: Option<&str>,
        to: Option<&str>,
        start_ts: Option<&str>,
        end_ts: Option<&str>,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            from_msisdn: non_empty(from).map(str::to_string),
            to_msisdn: non_empty(to).map(str::to_string),
            start_ts: parse_bound("start_ts", start_ts)?,
            end_ts: parse_bound("end_ts", end_ts)?,
        })
    }

    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE 1=1");

        if let Some(from) = &self.from_msisdn {
            builder.push(" AND from_msisdn = ").push_bind(from.clone());
        }
        if let Some(to) = &self.to_msisdn {
            builder.push(" AND to_msisdn = ").push_bind(to.clone());
        }
        if let Some(start) = self.start_ts {
            builder.push(" AND ts >= ").push_bind(format_ts(start));
        }
        if let Some(end) = self.end_ts {
            builder.push(" AND ts <= ").push_bind(format_ts(end));
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn parse_bound(
    param: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, QueryError> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => parse_ts(raw)
            .map(Some)
            .ok_or_else(|| QueryError::InvalidTimestamp {
                param,
                value: raw.to_string(),
            }),
    }
}

impl MessageStore {
    /// Fetch one page of messages, newest first.
    ///
    /// Rows with equal `ts` are ordered by `message_id` so pages are stable.
    /// The total and the page come from the same read transaction.
    pub async fn query(
        &self,
        filter: &MessageFilter,
        page: Pagination,
    ) -> Result<Page, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM messages");
        filter.push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT message_id, from_msisdn, to_msisdn, ts, text, created_at FROM messages",
        );
        filter.push_where(&mut select);
        select
            .push(" ORDER BY ts DESC, message_id ASC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows: Vec<MessageRow> = select.build_query_as().fetch_all(&mut *tx).await?;

        tx.commit().await?;

        let rows = rows
            .into_iter()
            .map(StoredMessage::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            rows,
            total: total.max(0) as u64,
        })
    }
}
