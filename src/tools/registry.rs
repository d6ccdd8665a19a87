use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::FutureExt;
use jsonschema::JSONSchema;
use serde_json::Value;

use crate::message::ToolResult;
use crate::tools::{Tool, ToolContext};

/// Set at agent construction and effectively immutable thereafter. Holds
/// tools plus their compiled JSON schemas for fast repeated validation.
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
    schemas: DashMap<String, Arc<JSONSchema>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: DashMap::new(), schemas: DashMap::new() }
    }

    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let registry = Self::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let spec = tool.spec();
        if let Ok(compiled) = JSONSchema::compile(&spec.input_schema) {
            self.schemas.insert(spec.name.clone(), Arc::new(compiled));
        }
        self.tools.insert(spec.name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|e| e.value().clone())
    }

    pub fn specs(&self) -> Vec<crate::tools::ToolSpec> {
        self.tools.iter().map(|e| e.value().spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `validate(args) -> bool`.
    pub fn validate(&self, name: &str, args: &Value) -> bool {
        match self.schemas.get(name) {
            Some(schema) => schema.is_valid(args),
            None => true,
        }
    }

    /// `parse(args) -> validated value | Err`. Schema-less tools accept any
    /// value (no schema was compiled for them).
    pub fn parse(&self, name: &str, args: Value) -> Result<Value, String> {
        let Some(schema) = self.schemas.get(name) else {
            return Ok(args);
        };
        let is_valid = schema.is_valid(&args);
        if is_valid {
            return Ok(args);
        }
        let messages: Vec<String> = match schema.validate(&args) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|e| e.to_string()).collect(),
        };
        Err(messages.join("; "))
    }

    /// Executes a single call end to end: validate → (timeout + retry) →
    /// execute, never propagating a Rust error or panic across the
    /// boundary — always produces a [`ToolResult`].
    pub async fn execute(&self, name: &str, id: String, args: Value, ctx: &ToolContext) -> ToolResult {
        let start = Instant::now();
        let Some(tool) = self.get(name) else {
            return ToolResult {
                id,
                name: name.to_string(),
                success: false,
                data: None,
                error: Some(format!("unknown tool: {name}")),
                duration_ms: start.elapsed().as_millis() as u64,
            };
        };

        let validated = match self.parse(name, args) {
            Ok(v) => v,
            Err(e) => {
                return ToolResult {
                    id,
                    name: name.to_string(),
                    success: false,
                    data: None,
                    error: Some(e),
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        };

        let spec = tool.spec();
        let retry = spec.retry.unwrap_or(crate::retry::RetryPolicy::None);

        let run_once = || {
            let tool = tool.clone();
            let args = validated.clone();
            let ctx = ctx.clone();
            async move {
                let fut = AssertUnwindSafe(tool.execute(args, &ctx)).catch_unwind();
                match fut.await {
                    Ok(inner) => inner,
                    Err(_) => Err("tool panicked".to_string()),
                }
            }
        };

        let timeout = spec.timeout;
        let run_timed = || async {
            match timeout {
                Some(d) => match tokio::time::timeout(d, run_once()).await {
                    Ok(r) => r,
                    Err(_) => Err("timed out".to_string()),
                },
                None => run_once().await,
            }
        };

        // Retry is not attempted on validation failures (already passed above);
        // it applies to execution failures from this point on.
        let outcome = retry.run(|_e: &String| true, run_timed).await;

        match outcome {
            Ok(data) => ToolResult {
                id,
                name: name.to_string(),
                success: true,
                data: Some(data),
                error: None,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => ToolResult {
                id,
                name: name.to_string(),
                success: false,
                data: None,
                error: Some(e),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: HashMap<String, ()> = self.tools.iter().map(|e| (e.key().clone(), ())).collect();
        f.debug_struct("ToolRegistry").field("tools", &names.keys().collect::<Vec<_>>()).finish()
    }
}
