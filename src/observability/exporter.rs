use async_trait::async_trait;
use tracing::info;

use super::TraceSpan;

/// Consumes a batch of sealed spans. Both contracts are fire-and-forget:
/// export failures are logged, never propagated to the caller that
/// triggered the flush.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, spans: Vec<TraceSpan>);
}

/// Logs each span as a structured `tracing` event. Useful for local
/// development and tests.
#[derive(Default)]
pub struct ConsoleExporter;

#[async_trait]
impl Exporter for ConsoleExporter {
    async fn export(&self, spans: Vec<TraceSpan>) {
        for span in spans {
            info!(
                span_id = %span.id,
                parent_id = ?span.parent_id,
                trace_id = %span.trace_id,
                name = %span.name,
                kind = ?span.kind,
                status = ?span.status,
                duration_ms = span.duration_ms,
                "span"
            );
        }
    }
}

/// Posts a batch of spans as JSON to an OTLP-over-HTTP-compatible
/// collector endpoint. Uses a minimal envelope rather than the full OTLP
/// protobuf schema, matching the contract shape (not the wire format) the
/// spec asks for.
pub struct OtlpHttpExporter {
    client: reqwest::Client,
    endpoint: String,
}

impl OtlpHttpExporter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into() }
    }
}

#[async_trait]
impl Exporter for OtlpHttpExporter {
    async fn export(&self, spans: Vec<TraceSpan>) {
        let payload: Vec<serde_json::Value> = spans
            .iter()
            .map(|span| {
                serde_json::json!({
                    "spanId": span.id,
                    "parentSpanId": span.parent_id,
                    "traceId": span.trace_id,
                    "name": span.name,
                    "kind": format!("{:?}", span.kind),
                    "status": match &span.status {
                        super::SpanStatus::Ok => serde_json::json!({"code": "OK"}),
                        super::SpanStatus::Error(msg) => serde_json::json!({"code": "ERROR", "message": msg}),
                    },
                    "durationMs": span.duration_ms,
                    "attributes": span.attributes,
                })
            })
            .collect();

        if let Err(e) = self.client.post(&self.endpoint).json(&payload).send().await {
            tracing::warn!(error = %e, "failed to export spans to OTLP endpoint");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct CollectingExporter {
        spans: Mutex<Vec<TraceSpan>>,
    }

    impl CollectingExporter {
        pub fn received(&self) -> Vec<TraceSpan> {
            self.spans.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Exporter for CollectingExporter {
        async fn export(&self, mut spans: Vec<TraceSpan>) {
            self.spans.lock().unwrap().append(&mut spans);
        }
    }
}
