use std::collections::HashMap;

use serde_json::Value;

use crate::cancel::AbortSignal;

/// The mutable state threaded through a workflow run: prior node outputs
/// keyed by node name, the initial input, the abort signal, and (during a
/// loop) the current `loopState`.
///
/// Each node executes against a snapshot of this context as it stood when
/// the node started — concurrent (parallel) siblings clone the same
/// snapshot and cannot observe each other's outputs; only after a node (or
/// a parallel node's aggregate) completes does its output get installed
/// into the parent context for downstream nodes to see.
#[derive(Clone, Debug)]
pub struct WorkflowContext {
    pub input: Value,
    pub outputs: HashMap<String, Value>,
    pub loop_state: Option<Value>,
    pub signal: AbortSignal,
}

impl WorkflowContext {
    pub fn new(input: Value, signal: AbortSignal) -> Self {
        Self { input, outputs: HashMap::new(), loop_state: None, signal }
    }

    pub fn output(&self, node_name: &str) -> Option<&Value> {
        self.outputs.get(node_name)
    }

    pub fn with_loop_state(&self, loop_state: Value) -> Self {
        let mut ctx = self.clone();
        ctx.loop_state = Some(loop_state);
        ctx
    }
}
