//! # agentrt
//!
//! A ReAct agent loop, a workflow DAG executor, and a hybrid vector+lexical
//! retrieval engine, sharing one retry/cancellation/error model.
//!
//! ## Main modules
//!
//! - [`agent`]: [`agent::Agent`], [`agent::AgentConfig`], [`agent::AgentRunResult`],
//!   [`agent::AgentStreamChunk`] — the bounded reasoning/acting/observing loop.
//! - [`workflow`]: [`workflow::WorkflowGraph`], [`workflow::node`] node kinds,
//!   [`workflow::WorkflowContext`] — the DAG executor.
//! - [`retrieval`]: [`retrieval::CollectionStore`], [`retrieval::Embedder`],
//!   [`retrieval::Splitter`] — chunking plus hybrid vector/lexical search.
//! - [`guardrail`]: [`guardrail::GuardrailPipeline`], [`guardrail::Rule`] — input/output
//!   rule chains with pass/warn/block/redact actions.
//! - [`llm`]: [`llm::LlmAdapter`] trait, [`llm::MockAdapter`], [`llm::HttpAdapter`].
//! - [`tools`]: [`tools::Tool`] trait, [`tools::ToolRegistry`].
//! - [`observability`]: [`observability::Tracer`], span/exporter types.
//! - [`config`]: environment fallback resolution, [`config::RunConfigSummary`].
//! - [`message`]: [`message::Message`], [`message::ToolCall`], [`message::ToolResult`].
//! - [`error`]: the crate-wide [`error::AgentError`].
//! - [`retry`]: shared backoff policy.
//! - [`cancel`]: the cloneable [`cancel::AbortSignal`].

pub mod agent;
pub mod cancel;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod llm;
pub mod message;
pub mod observability;
pub mod retrieval;
pub mod retry;
pub mod tools;
pub mod workflow;

pub use agent::{Agent, AgentConfig, AgentRunResult, AgentStreamChunk, FinishReason};
pub use cancel::AbortSignal;
pub use error::AgentError;
pub use message::{Message, TokenUsage, ToolCall, ToolResult};
pub use retry::RetryPolicy;
pub use tools::{Tool, ToolContext, ToolRegistry, ToolSpec};

#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_test_writer().with_filter(filter))
            .try_init();
    }
}
