//! Process-wide request counters.
//!
//! Owned by the web layer and updated around the ingestion pipeline; the
//! pipeline itself never touches them.

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Request counters, registered on a registry owned by this instance.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,

    pub http_requests_total: IntCounter,
    pub webhook_requests_total: IntCounter,
    pub webhook_rejected_total: IntCounter,
    pub webhook_duplicates_total: IntCounter,
    pub webhook_storage_errors_total: IntCounter,
}

impl Metrics {
    /// Create the counters and register them.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let http_requests_total = counter("http_requests_total", "Total number of HTTP requests")?;
        let webhook_requests_total =
            counter("webhook_requests_total", "Total webhook requests received")?;
        let webhook_rejected_total = counter(
            "webhook_rejected_total",
            "Webhook requests rejected for signature or payload",
        )?;
        let webhook_duplicates_total = counter(
            "webhook_duplicates_total",
            "Webhook deliveries of an already stored message",
        )?;
        let webhook_storage_errors_total = counter(
            "webhook_storage_errors_total",
            "Webhook requests that failed in storage",
        )?;

        Ok(Self {
            registry,
            http_requests_total,
            webhook_requests_total,
            webhook_rejected_total,
            webhook_duplicates_total,
            webhook_storage_errors_total,
        })
    }

    /// Render all counters in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
