use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::LlmAdapter;
use crate::message::Message;
use crate::tools::Tool;

use super::context::WorkflowContext;
use super::error::WorkflowError;

pub type PromptFn = Arc<dyn Fn(&WorkflowContext) -> String + Send + Sync>;
pub type MessagesFn = Arc<dyn Fn(&WorkflowContext) -> Vec<Message> + Send + Sync>;
pub type ToolInputFn = Arc<dyn Fn(&WorkflowContext) -> Value + Send + Sync>;
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
pub type PredicateFn = Arc<dyn Fn(&WorkflowContext) -> bool + Send + Sync>;
pub type SwitchKeyFn = Arc<dyn Fn(&WorkflowContext) -> String + Send + Sync>;
pub type ItemsFn = Arc<dyn Fn(&WorkflowContext) -> Vec<Value> + Send + Sync>;
pub type ReducerFn = Arc<dyn Fn(Value, Value) -> Value + Send + Sync>;

/// Built from an adapter plus exactly one of `prompt` (a single user
/// message) or `messages` (a full non-system sequence; any system entries
/// supplied are stripped — `system_prompt` is the only system voice).
pub struct LlmNodeConfig {
    pub llm: Arc<dyn LlmAdapter>,
    pub system_prompt: Option<String>,
    pub prompt: Option<PromptFn>,
    pub messages: Option<MessagesFn>,
    pub temperature: Option<f32>,
}

pub struct ToolNodeConfig {
    pub tool: Arc<dyn Tool>,
    pub input: Option<ToolInputFn>,
    pub transform: Option<TransformFn>,
}

pub struct ConditionNodeConfig {
    pub predicate: PredicateFn,
    pub if_true: String,
    pub if_false: String,
}

pub struct SwitchNodeConfig {
    pub key: SwitchKeyFn,
    pub cases: HashMap<String, String>,
    pub default: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    All,
    Partial,
}

pub enum ParallelMode {
    Fixed(Vec<Arc<WorkflowNode>>),
    ForEach { items: ItemsFn, body: Arc<WorkflowNode> },
}

pub struct ParallelNodeConfig {
    pub mode: ParallelMode,
    pub max_concurrency: usize,
    pub failure_policy: FailurePolicy,
}

impl ParallelNodeConfig {
    pub fn new(mode: ParallelMode) -> Self {
        Self { mode, max_concurrency: 10, failure_policy: FailurePolicy::All }
    }
}

/// Arbitrary node logic. May declare schemas the executor enforces around
/// `execute` (unchecked when absent).
#[async_trait]
pub trait CustomNode: Send + Sync {
    async fn execute(&self, input: Value, ctx: &WorkflowContext) -> Result<Value, String>;

    fn input_schema(&self) -> Option<Value> {
        None
    }

    fn output_schema(&self) -> Option<Value> {
        None
    }
}

/// What one loop-body iteration produced. `Continue` threads a value into
/// the loop's own output accumulation; `Break` ends the loop immediately,
/// optionally supplying the loop's final result.
pub enum LoopSignal {
    Continue(Value),
    Break(Option<Value>),
}

/// The repeated unit of work inside a loop node. `item` is `Some` for
/// `forEach` iterations and `None` for `while`/`until`/`times`.
#[async_trait]
pub trait LoopBody: Send + Sync {
    async fn run(&self, item: Option<Value>, ctx: &WorkflowContext) -> Result<LoopSignal, WorkflowError>;
}

pub enum LoopKind {
    While { condition: PredicateFn, body: Arc<dyn LoopBody> },
    Until { condition: PredicateFn, body: Arc<dyn LoopBody> },
    Times { count: u32, body: Arc<dyn LoopBody> },
    ForEach { items: ItemsFn, body: Arc<dyn LoopBody>, concurrency: usize },
    Reduce { items: ItemsFn, initial: Value, reducer: ReducerFn },
}

pub struct LoopNodeConfig {
    pub kind: LoopKind,
    pub max_iterations: u32,
}

impl LoopNodeConfig {
    pub fn new(kind: LoopKind) -> Self {
        Self { kind, max_iterations: 100 }
    }
}

pub enum NodeKind {
    Llm(LlmNodeConfig),
    Tool(ToolNodeConfig),
    Condition(ConditionNodeConfig),
    Switch(SwitchNodeConfig),
    Parallel(ParallelNodeConfig),
    Custom(Arc<dyn CustomNode>),
    Loop(LoopNodeConfig),
}

pub struct WorkflowNode {
    pub name: String,
    pub kind: NodeKind,
}

impl WorkflowNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self { name: name.into(), kind }
    }

    /// Declared successor node names for static graph validation. Condition
    /// and switch nodes contribute their full set of possible targets; the
    /// branch actually taken is resolved only at execution time.
    pub fn declared_targets(&self) -> Vec<String> {
        match &self.kind {
            NodeKind::Condition(c) => vec![c.if_true.clone(), c.if_false.clone()],
            NodeKind::Switch(s) => {
                let mut targets: Vec<String> = s.cases.values().cloned().collect();
                targets.push(s.default.clone());
                targets
            }
            _ => Vec::new(),
        }
    }
}
