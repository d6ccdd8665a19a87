//! Tool registry: named, schema-validated, side-effecting callables with
//! timeout/retry/approval.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use agentrt::tools::{Tool, ToolContext, ToolSpec};
//!
//! struct Add;
//!
//! #[async_trait]
//! impl Tool for Add {
//!     fn name(&self) -> &str { "add" }
//!
//!     fn spec(&self) -> ToolSpec {
//!         ToolSpec {
//!             name: "add".to_string(),
//!             description: "Adds two numbers".to_string(),
//!             input_schema: json!({
//!                 "type": "object",
//!                 "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
//!                 "required": ["a", "b"],
//!             }),
//!             timeout: None,
//!             retry: None,
//!             requires_approval: false,
//!         }
//!     }
//!
//!     async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, String> {
//!         let a = args["a"].as_f64().unwrap_or(0.0);
//!         let b = args["b"].as_f64().unwrap_or(0.0);
//!         Ok(json!(a + b))
//!     }
//! }
//! ```

mod registry;

pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::cancel::AbortSignal;
use crate::retry::RetryPolicy;

/// Name, description, and JSON-Schema (draft-07-compatible) shape passed to
/// the LLM adapter, plus per-tool timeout/retry/approval.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    pub requires_approval: bool,
}

/// Per-call context passed to `execute`: `{executionId, threadId?, userId?, signal}`.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub execution_id: String,
    pub thread_id: Option<String>,
    pub user_id: Option<String>,
    pub signal: AbortSignal,
}

impl ToolContext {
    pub fn new(execution_id: impl Into<String>, signal: AbortSignal) -> Self {
        Self { execution_id: execution_id.into(), thread_id: None, user_id: None, signal }
    }
}

/// A registered tool. `execute` is pure with respect to the agent loop —
/// side effects it causes are externally visible, but it never mutates the
/// conversation itself.
///
/// **Invariant**: `execute` is only invoked by [`ToolRegistry`] with values
/// that already passed [`ToolSpec::input_schema`] validation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> ToolSpec;

    /// Runs the tool. May return `Err` for any internal failure; the
    /// registry catches this (and panics) and turns it into a tool-result
    /// failure rather than propagating across the tool boundary.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, String>;
}
