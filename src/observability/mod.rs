//! Observability spine: every agent run, tool call, and LLM call opens a
//! span; spans nest via a parent/child relation and are exported in
//! batches once sealed.

pub(crate) mod exporter;

pub use exporter::{ConsoleExporter, Exporter, OtlpHttpExporter};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanKind {
    Llm,
    Tool,
    Agent,
    Workflow,
    Custom,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error(String),
}

#[derive(Clone, Debug)]
pub struct SpanEvent {
    pub name: String,
    pub attributes: HashMap<String, Value>,
}

/// A timed, attributed interval in the observability tree. Sealed (status
/// and duration fixed) once [`Tracer::end`] is called.
#[derive(Clone, Debug)]
pub struct TraceSpan {
    pub id: String,
    pub parent_id: Option<String>,
    pub trace_id: String,
    pub name: String,
    pub kind: SpanKind,
    pub attributes: HashMap<String, Value>,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
    pub duration_ms: u64,
}

/// An in-progress span: returned by [`Tracer::start`], sealed by
/// [`Tracer::end`].
pub struct OpenSpan {
    id: String,
    parent_id: Option<String>,
    trace_id: String,
    name: String,
    kind: SpanKind,
    attributes: HashMap<String, Value>,
    events: Vec<SpanEvent>,
    started_at: Instant,
    sampled: bool,
}

impl OpenSpan {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn add_event(&mut self, name: impl Into<String>, attributes: HashMap<String, Value>) {
        self.events.push(SpanEvent { name: name.into(), attributes });
    }
}

/// Owns the span buffer and drives export. Sampling is a single
/// probabilistic rate applied at span start: unsampled spans are tracked
/// (for parent/child id continuity) but never reach the exporter.
pub struct Tracer {
    exporter: Arc<dyn Exporter>,
    sample_rate: f64,
    sealed: Mutex<Vec<TraceSpan>>,
}

impl Tracer {
    pub fn new(exporter: Arc<dyn Exporter>, sample_rate: f64) -> Self {
        Self { exporter, sample_rate: sample_rate.clamp(0.0, 1.0), sealed: Mutex::new(Vec::new()) }
    }

    pub fn start(&self, kind: SpanKind, name: impl Into<String>, parent: Option<&OpenSpan>) -> OpenSpan {
        let sampled = self.sample_rate >= 1.0 || rand::thread_rng().gen_bool(self.sample_rate.max(0.0));
        OpenSpan {
            id: Uuid::new_v4().to_string(),
            parent_id: parent.map(|p| p.id.clone()),
            trace_id: parent.map(|p| p.trace_id.clone()).unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: name.into(),
            kind,
            attributes: HashMap::new(),
            events: Vec::new(),
            started_at: Instant::now(),
            sampled,
        }
    }

    /// Seals the span and, if it was sampled, queues it for the next
    /// [`Tracer::flush`].
    pub async fn end(&self, span: OpenSpan, status: SpanStatus) {
        if !span.sampled {
            return;
        }
        let sealed = TraceSpan {
            id: span.id,
            parent_id: span.parent_id,
            trace_id: span.trace_id,
            name: span.name,
            kind: span.kind,
            attributes: span.attributes,
            events: span.events,
            status,
            duration_ms: format_duration(span.started_at.elapsed()),
        };
        self.sealed.lock().expect("span buffer poisoned").push(sealed);
    }

    pub async fn flush(&self) {
        let batch: Vec<TraceSpan> = std::mem::take(&mut self.sealed.lock().expect("span buffer poisoned"));
        if !batch.is_empty() {
            self.exporter.export(batch).await;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.sealed.lock().expect("span buffer poisoned").len()
    }
}

pub(crate) fn format_duration(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use exporter::tests::CollectingExporter;

    #[tokio::test]
    async fn sampled_spans_are_queued_and_flushed() {
        let exporter = Arc::new(CollectingExporter::default());
        let tracer = Tracer::new(exporter.clone(), 1.0);

        let span = tracer.start(SpanKind::Agent, "run", None);
        tracer.end(span, SpanStatus::Ok).await;
        assert_eq!(tracer.pending_count(), 1);

        tracer.flush().await;
        assert_eq!(tracer.pending_count(), 0);
        assert_eq!(exporter.received().len(), 1);
    }

    #[tokio::test]
    async fn zero_sample_rate_drops_every_span() {
        let exporter = Arc::new(CollectingExporter::default());
        let tracer = Tracer::new(exporter.clone(), 0.0);

        let span = tracer.start(SpanKind::Tool, "call", None);
        tracer.end(span, SpanStatus::Ok).await;
        assert_eq!(tracer.pending_count(), 0);
    }

    #[tokio::test]
    async fn child_span_inherits_trace_id_from_parent() {
        let exporter = Arc::new(CollectingExporter::default());
        let tracer = Tracer::new(exporter, 1.0);

        let parent = tracer.start(SpanKind::Workflow, "workflow", None);
        let child = tracer.start(SpanKind::Tool, "node", Some(&parent));
        assert_eq!(child.trace_id, parent.trace_id);
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
    }
}
