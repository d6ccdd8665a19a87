//! Crate-wide error type.
//!
//! Subsystems (tools, workflow, retrieval) define their own small `thiserror`
//! enums and convert into [`AgentError`] at the boundary, composing
//! per-module errors into one top-level error.

use thiserror::Error;

/// Failure taxonomy shared by the agent loop, workflow executor, and
/// retrieval engine.
#[derive(Debug, Error, Clone)]
pub enum AgentError {
    /// The LLM adapter call failed (network, provider error, malformed stream).
    #[error("llm error: {0}")]
    LlmError(String),

    /// A tool returned a failure result. Not fatal to the run — fed back as
    /// an observation so the model can decide the next action.
    #[error("tool error: {0}")]
    ToolError(String),

    /// Tool arguments failed schema validation.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The caller's abort signal fired.
    #[error("aborted")]
    Aborted,

    /// A tool or adapter call exceeded its configured timeout.
    #[error("timed out")]
    Timeout,

    /// Construction-time misconfiguration (duplicate node name, missing
    /// edge endpoint, missing start node, dimension mismatch, ...). Always
    /// fatal, raised before any run begins.
    #[error("config error: {0}")]
    ConfigError(String),

    /// Retrieval-engine failure (dimension mismatch, missing collection).
    #[error("retrieval error: {0}")]
    RetrievalError(String),

    /// An input or output guardrail blocked the run.
    #[error("guardrail blocked: {0}")]
    GuardrailBlock(String),

    /// Anything else, wrapped.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl AgentError {
    /// True for errors that are recovered locally as a tool observation fed
    /// back to the model, rather than terminating the run.
    pub fn is_recoverable_as_observation(&self) -> bool {
        matches!(self, AgentError::ToolError(_) | AgentError::ValidationError(_))
    }
}
