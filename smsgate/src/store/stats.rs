//! Summary statistics over the message table.

use super::types::{SenderCount, Stats};
use super::{MessageStore, StoreError};
use crate::util::parse_ts;

/// Number of senders listed in `messages_per_sender`.
pub const TOP_SENDERS_LIMIT: i64 = 10;

impl MessageStore {
    /// Compute totals, time range and top senders from one read transaction.
    pub async fn compute_stats(&self) -> Result<Stats, StoreError> {
        let mut tx = self.pool.begin().await?;

        let (total, senders, first, last): (i64, i64, Option<String>, Option<String>) =
            sqlx::query_as(
                "SELECT COUNT(*), COUNT(DISTINCT from_msisdn), MIN(ts), MAX(ts) FROM messages",
            )
            .fetch_one(&mut *tx)
            .await?;

        let top: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT from_msisdn, COUNT(*) AS count
            FROM messages
            GROUP BY from_msisdn
            ORDER BY count DESC, from_msisdn ASC
            LIMIT ?
            "#,
        )
        .bind(TOP_SENDERS_LIMIT)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Stats {
            total_messages: total.max(0) as u64,
            senders_count: senders.max(0) as u64,
            messages_per_sender: top
                .into_iter()
                .map(|(from_msisdn, count)| SenderCount {
                    from_msisdn,
                    count: count.max(0) as u64,
                })
                .collect(),
            first_message_ts: decode_bound("first_message_ts", first)?,
            last_message_ts: decode_bound("last_message_ts", last)?,
        })
    }
}

fn decode_bound(
    label: &str,
    raw: Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, StoreError> {
    match raw {
        None => Ok(None),
        Some(raw) => parse_ts(&raw).map(Some).ok_or_else(|| StoreError::CorruptRow {
            message_id: label.to_string(),
            reason: format!("unparseable ts {:?}", raw),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{message, temp_store, ts};

    #[tokio::test]
    async fn test_stats_empty_store() {
        let (_dir, store) = temp_store().await;
        let stats = store.compute_stats().await.unwrap();

        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.senders_count, 0);
        assert!(stats.messages_per_sender.is_empty());
        assert_eq!(stats.first_message_ts, None);
        assert_eq!(stats.last_message_ts, None);
    }

    #[tokio::test]
    async fn test_stats_counts_and_range() {
        let (_dir, store) = temp_store().await;
        store.insert(&message("a", "+1", "+9", "2024-03-01T00:00:00Z")).await.unwrap();
        store.insert(&message("b", "+2", "+9", "2024-01-01T00:00:00Z")).await.unwrap();
        store.insert(&message("c", "+2", "+9", "2024-02-01T00:00:00Z")).await.unwrap();
        // duplicates are not double-counted
        store.insert(&message("c", "+2", "+9", "2024-02-01T00:00:00Z")).await.unwrap();

        let stats = store.compute_stats().await.unwrap();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.senders_count, 2);
        assert_eq!(
            stats.messages_per_sender,
            vec![
                SenderCount { from_msisdn: "+2".to_string(), count: 2 },
                SenderCount { from_msisdn: "+1".to_string(), count: 1 },
            ]
        );
        assert_eq!(stats.first_message_ts, Some(ts("2024-01-01T00:00:00Z")));
        assert_eq!(stats.last_message_ts, Some(ts("2024-03-01T00:00:00Z")));
    }

    #[tokio::test]
    async fn test_top_senders_capped_but_sender_count_is_not() {
        let (_dir, store) = temp_store().await;
        for sender in 0..12 {
            for n in 0..=sender {
                let id = format!("s{}-{}", sender, n);
                let from = format!("+1000{:02}", sender);
                store
                    .insert(&message(&id, &from, "+9", "2024-01-01T00:00:00Z"))
                    .await
                    .unwrap();
            }
        }

        let stats = store.compute_stats().await.unwrap();
        assert_eq!(stats.messages_per_sender.len(), TOP_SENDERS_LIMIT as usize);
        assert_eq!(stats.senders_count, 12);
        assert_eq!(stats.messages_per_sender[0].from_msisdn, "+100011");
        assert_eq!(stats.messages_per_sender[0].count, 12);
        let counts: Vec<u64> = stats.messages_per_sender.iter().map(|s| s.count).collect();
        let mut sorted = counts.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(counts, sorted);
    }

    #[tokio::test]
    async fn test_stats_json_shape() {
        let (_dir, store) = temp_store().await;
        store
            .insert(&message("m1", "+15551234", "+15559999", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();

        let json = serde_json::to_value(store.compute_stats().await.unwrap()).unwrap();
        assert_eq!(json["total_messages"], 1);
        assert_eq!(json["senders_count"], 1);
        assert_eq!(json["messages_per_sender"][0]["from"], "+15551234");
        assert_eq!(json["messages_per_sender"][0]["count"], 1);
        assert_eq!(json["first_message_ts"], "2024-01-01T00:00:00Z");
    }
}
