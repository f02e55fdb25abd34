//! Webhook ingestion pipeline.
//!
//! ## Processing Flow
//!
//! ```text
//! raw body + X-Signature → verify() → validate() → MessageStore::insert() → Created | Duplicate
//! ```
//!
//! The body is never parsed unless its signature checks out.

pub mod payload;
pub mod signature;

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::store::{InsertOutcome, MessageStore, StoreError};

pub use payload::{validate, ValidationError, MAX_TEXT_CHARS};
pub use signature::{sign, verify, SIGNATURE_HEADER};

/// Reasons an ingestion attempt did not produce a stored (or already stored) message.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("signature header missing")]
    MissingSignature,

    #[error("signature does not match body")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ValidationError),

    #[error("storage unavailable: {0}")]
    Storage(#[from] StoreError),
}

impl IngestError {
    /// Short machine-readable reason used in logs.
    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::MissingSignature => "missing_signature",
            IngestError::InvalidSignature => "invalid_signature",
            IngestError::InvalidPayload(_) => "invalid_payload",
            IngestError::Storage(_) => "storage_unavailable",
        }
    }

    /// Whether the caller failed authentication.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            IngestError::MissingSignature | IngestError::InvalidSignature
        )
    }
}

/// Verify → validate → insert, bound to one secret and one store.
#[derive(Clone)]
pub struct Ingestor {
    secret: Arc<str>,
    store: MessageStore,
}

impl Ingestor {
    pub fn new(secret: impl Into<Arc<str>>, store: MessageStore) -> Self {
        Self {
            secret: secret.into(),
            store,
        }
    }

    /// Run one webhook delivery through the pipeline.
    ///
    /// `Duplicate` is a success: a retried delivery must not look like an error
    /// to the sender.
    pub async fn ingest(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<InsertOutcome, IngestError> {
        let result = self.run(raw_body, signature).await;

        match &result {
            Ok(_) => {}
            Err(IngestError::Storage(e)) => {
                error!(
                    event = "webhook",
                    result = "error",
                    reason = "storage_unavailable",
                    error = %e,
                    "webhook_failed"
                );
            }
            Err(e) => {
                warn!(
                    event = "webhook",
                    result = "rejected",
                    reason = e.reason(),
                    detail = %e,
                    "webhook_rejected"
                );
            }
        }

        result
    }

    async fn run(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<InsertOutcome, IngestError> {
        let signature = signature.ok_or(IngestError::MissingSignature)?;

        if !verify(&self.secret, raw_body, signature) {
            return Err(IngestError::InvalidSignature);
        }

        let message = validate(raw_body)?;
        let outcome = self.store.insert(&message).await?;

        info!(
            event = "webhook",
            result = outcome.as_str(),
            message_id = %message.message_id,
            dup = outcome == InsertOutcome::Duplicate,
            "webhook_processed"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;
    use crate::store::{MessageFilter, Pagination};

    const SECRET: &str = "testsecret";
    const M1: &[u8] = br#"{"message_id":"m1","from":"+15551234","to":"+15559999","ts":"2024-01-01T00:00:00Z","text":"hi"}"#;

    async fn stored_ids(store: &MessageStore) -> Vec<String> {
        store
            .query(&MessageFilter::default(), Pagination::default())
            .await
            .unwrap()
            .rows
            .into_iter()
            .map(|r| r.message_id)
            .collect()
    }

    #[tokio::test]
    async fn test_created_then_duplicate() {
        let (_dir, store) = temp_store().await;
        let ingestor = Ingestor::new(SECRET, store.clone());
        let signature = sign(SECRET, M1).unwrap();

        let first = ingestor.ingest(M1, Some(&signature)).await.unwrap();
        let second = ingestor.ingest(M1, Some(&signature)).await.unwrap();

        assert_eq!(first, InsertOutcome::Created);
        assert_eq!(second, InsertOutcome::Duplicate);
        assert_eq!(stored_ids(&store).await, vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_signature_rejected() {
        let (_dir, store) = temp_store().await;
        let ingestor = Ingestor::new(SECRET, store.clone());

        let err = ingestor.ingest(M1, None).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingSignature));
        assert!(err.is_unauthenticated());
        assert!(stored_ids(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_signature_checked_before_parsing() {
        let (_dir, store) = temp_store().await;
        let ingestor = Ingestor::new(SECRET, store);

        // Garbage body with a wrong signature must fail authentication, not validation.
        let err = ingestor.ingest(b"{not json", Some("deadbeef")).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidSignature));

        let wrong = sign("other-secret", M1).unwrap();
        let err = ingestor.ingest(M1, Some(&wrong)).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidSignature));
        assert_eq!(err.reason(), "invalid_signature");
    }

    #[tokio::test]
    async fn test_invalid_msisdn_with_valid_signature() {
        let (_dir, store) = temp_store().await;
        let ingestor = Ingestor::new(SECRET, store.clone());
        let body = br#"{"message_id":"m1","from":"5551234","to":"+15559999","ts":"2024-01-01T00:00:00Z"}"#;
        let signature = sign(SECRET, body).unwrap();

        let err = ingestor.ingest(body, Some(&signature)).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidPayload(_)));
        assert!(!err.is_unauthenticated());
        assert_eq!(err.reason(), "invalid_payload");
        assert!(stored_ids(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_unstorable_timestamp_keeps_reads_working() {
        let (_dir, store) = temp_store().await;
        let ingestor = Ingestor::new(SECRET, store.clone());
        let far = br#"{"message_id":"far","from":"+15551234","to":"+15559999","ts":"+12345-01-01T00:00:00"}"#;
        let signature = sign(SECRET, far).unwrap();

        let err = ingestor.ingest(far, Some(&signature)).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidPayload(_)));

        let signature = sign(SECRET, M1).unwrap();
        ingestor.ingest(M1, Some(&signature)).await.unwrap();

        assert_eq!(stored_ids(&store).await, vec!["m1".to_string()]);
        let stats = store.compute_stats().await.unwrap();
        assert_eq!(stats.total_messages, 1);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let (_dir, store) = temp_store().await;
        let ingestor = Ingestor::new(SECRET, store.clone());
        store.close().await;

        let signature = sign(SECRET, M1).unwrap();
        let err = ingestor.ingest(M1, Some(&signature)).await.unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));
        assert_eq!(err.reason(), "storage_unavailable");
    }
}
