//! Workflow DAG executor: a graph of typed nodes executed in topological
//! order with branch pruning, bounded parallelism, and bounded loops.

mod context;
mod error;
pub mod node;

pub use context::WorkflowContext;
pub use error::WorkflowError;
pub use node::{
    ConditionNodeConfig, CustomNode, FailurePolicy, ItemsFn, LlmNodeConfig, LoopBody, LoopKind,
    LoopNodeConfig, LoopSignal, MessagesFn, NodeKind, ParallelMode, ParallelNodeConfig, PredicateFn,
    PromptFn, ReducerFn, SwitchKeyFn, SwitchNodeConfig, ToolInputFn, ToolNodeConfig, TransformFn,
    WorkflowNode,
};

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::cancel::AbortSignal;
use crate::llm::{ChatRequest, LlmChunk};
use crate::message::Message;
use crate::tools::ToolContext;

#[derive(Clone, Debug)]
pub enum WorkflowEvent {
    WorkflowStart,
    NodeStart { name: String },
    LlmToken { name: String, delta: String },
    NodeComplete { name: String },
    NodeError { name: String, error: String },
    WorkflowComplete,
    WorkflowError { error: String },
}

#[derive(Clone, Debug)]
pub struct WorkflowExecutionResult {
    pub node_outputs: HashMap<String, Value>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Validated, executable node graph: names unique, every edge endpoint
/// resolves, a start node exists, and the static edge set (explicit edges
/// plus condition/switch declared targets) is acyclic.
pub struct WorkflowGraph {
    nodes: HashMap<String, Arc<WorkflowNode>>,
    order: Vec<String>,
    edges: Vec<(String, String)>,
    start: String,
}

impl WorkflowGraph {
    pub fn builder() -> WorkflowGraphBuilder {
        WorkflowGraphBuilder::default()
    }

    /// Runs the graph to completion, returning the final result without an
    /// event stream.
    pub async fn execute(&self, input: Value, signal: AbortSignal) -> WorkflowExecutionResult {
        run(self, input, signal, None).await
    }

    /// Runs the graph, emitting an ordered [`WorkflowEvent`] stream as it
    /// goes. Takes `Arc<Self>` so the run can proceed on its own task while
    /// the caller drains events; the channel closes once the run finishes.
    pub fn stream(self: Arc<Self>, input: Value, signal: AbortSignal) -> mpsc::Receiver<WorkflowEvent> {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            run(&self, input, signal, Some(tx)).await;
        });
        rx
    }
}

#[derive(Default)]
pub struct WorkflowGraphBuilder {
    nodes: HashMap<String, Arc<WorkflowNode>>,
    edges: Vec<(String, String)>,
    start: Option<String>,
    insertion_order: Vec<String>,
}

impl WorkflowGraphBuilder {
    pub fn add_node(mut self, node: WorkflowNode) -> Self {
        self.insertion_order.push(node.name.clone());
        self.nodes.insert(node.name.clone(), Arc::new(node));
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn start(mut self, name: impl Into<String>) -> Self {
        self.start = Some(name.into());
        self
    }

    pub fn build(self) -> Result<WorkflowGraph, WorkflowError> {
        let start = self.start.ok_or_else(|| WorkflowError::MissingStartNode("<unset>".to_string()))?;
        if !self.nodes.contains_key(&start) {
            return Err(WorkflowError::MissingStartNode(start));
        }

        let mut all_edges = self.edges.clone();
        for node in self.nodes.values() {
            for target in node.declared_targets() {
                all_edges.push((node.name.clone(), target));
            }
        }

        for (from, to) in &all_edges {
            if !self.nodes.contains_key(from) {
                return Err(WorkflowError::UnresolvedEdge(from.clone()));
            }
            if !self.nodes.contains_key(to) {
                return Err(WorkflowError::UnresolvedEdge(to.clone()));
            }
        }

        let order = topological_order(&self.insertion_order, &all_edges)?;

        Ok(WorkflowGraph { nodes: self.nodes, order, edges: all_edges, start })
    }
}

fn topological_order(names: &[String], edges: &[(String, String)]) -> Result<Vec<String>, WorkflowError> {
    let mut in_degree: HashMap<&str, usize> = names.iter().map(|n| (n.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = names.iter().map(|n| (n.as_str(), Vec::new())).collect();
    for (from, to) in edges {
        *in_degree.get_mut(to.as_str()).unwrap() += 1;
        adjacency.get_mut(from.as_str()).unwrap().push(to.as_str());
    }

    let mut queue: Vec<&str> = names.iter().map(|n| n.as_str()).filter(|n| in_degree[n] == 0).collect();
    let mut order = Vec::with_capacity(names.len());
    while let Some(n) = queue.pop() {
        order.push(n.to_string());
        for &next in &adjacency[n] {
            let degree = in_degree.get_mut(next).unwrap();
            *degree -= 1;
            if *degree == 0 {
                queue.push(next);
            }
        }
    }

    if order.len() != names.len() {
        let stuck = names.iter().find(|n| !order.contains(n)).cloned().unwrap_or_default();
        return Err(WorkflowError::Cycle(stuck));
    }
    Ok(order)
}

/// Decision recorded by a condition/switch node: which declared edge is
/// "live" for this run.
enum Branch {
    Taken(String),
}

async fn run(
    graph: &WorkflowGraph,
    input: Value,
    signal: AbortSignal,
    events: Option<mpsc::Sender<WorkflowEvent>>,
) -> WorkflowExecutionResult {
    let start_time = Instant::now();
    if let Some(tx) = &events {
        let _ = tx.send(WorkflowEvent::WorkflowStart).await;
    }

    let mut ctx = WorkflowContext::new(input, signal.clone());
    let mut reachable: HashSet<String> = HashSet::from([graph.start.clone()]);
    let mut branch_decisions: HashMap<String, Branch> = HashMap::new();
    let mut error: Option<String> = None;

    for name in &graph.order {
        if signal.is_aborted() {
            error = Some("aborted".to_string());
            break;
        }
        if !reachable.contains(name) {
            continue;
        }

        let node = graph.nodes.get(name).expect("topological order only contains graph nodes");
        if let Some(tx) = &events {
            let _ = tx.send(WorkflowEvent::NodeStart { name: name.clone() }).await;
        }

        let outcome = execute_node(node, &ctx, events.as_ref()).await;
        match outcome {
            Ok(NodeOutcome { output, branch }) => {
                ctx.outputs.insert(name.clone(), output);
                if let Some(target) = branch {
                    branch_decisions.insert(name.clone(), Branch::Taken(target));
                }
                if let Some(tx) = &events {
                    let _ = tx.send(WorkflowEvent::NodeComplete { name: name.clone() }).await;
                }
            }
            Err(e) => {
                if let Some(tx) = &events {
                    let _ = tx.send(WorkflowEvent::NodeError { name: name.clone(), error: e.to_string() }).await;
                }
                error = Some(e.to_string());
                break;
            }
        }

        // Propagate reachability to this node's successors, honoring any
        // branch decision it just made.
        for (from, to) in &graph.edges {
            if from != name {
                continue;
            }
            let active = match branch_decisions.get(name) {
                Some(Branch::Taken(target)) => target == to,
                None => true,
            };
            if active {
                reachable.insert(to.clone());
            }
        }
    }

    if let Some(tx) = &events {
        match &error {
            Some(e) => {
                let _ = tx.send(WorkflowEvent::WorkflowError { error: e.clone() }).await;
            }
            None => {
                let _ = tx.send(WorkflowEvent::WorkflowComplete).await;
            }
        }
    }

    WorkflowExecutionResult {
        node_outputs: ctx.outputs,
        duration_ms: start_time.elapsed().as_millis() as u64,
        error,
    }
}

struct NodeOutcome {
    output: Value,
    branch: Option<String>,
}

fn ok(output: Value) -> Result<NodeOutcome, WorkflowError> {
    Ok(NodeOutcome { output, branch: None })
}

/// Explicitly boxed rather than a plain `async fn`: node execution recurses
/// through parallel/loop bodies, and the Send auto-trait check on a
/// recursive opaque future type does not terminate without this.
fn execute_node<'a>(
    node: &'a WorkflowNode,
    ctx: &'a WorkflowContext,
    events: Option<&'a mpsc::Sender<WorkflowEvent>>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<NodeOutcome, WorkflowError>> + Send + 'a>> {
    Box::pin(execute_node_inner(node, ctx, events))
}

async fn execute_node_inner(
    node: &WorkflowNode,
    ctx: &WorkflowContext,
    events: Option<&mpsc::Sender<WorkflowEvent>>,
) -> Result<NodeOutcome, WorkflowError> {
    match &node.kind {
        NodeKind::Llm(config) => run_llm_node(&node.name, config, ctx, events).await,
        NodeKind::Tool(config) => run_tool_node(config, ctx).await,
        NodeKind::Condition(config) => {
            let branch = if (config.predicate)(ctx) { config.if_true.clone() } else { config.if_false.clone() };
            Ok(NodeOutcome { output: serde_json::json!({ "branch": branch }), branch: Some(branch) })
        }
        NodeKind::Switch(config) => {
            let key = (config.key)(ctx);
            let branch = config.cases.get(&key).cloned().unwrap_or_else(|| config.default.clone());
            Ok(NodeOutcome { output: serde_json::json!({ "key": key, "branch": branch }), branch: Some(branch) })
        }
        NodeKind::Parallel(config) => run_parallel_node(config, ctx).await,
        NodeKind::Custom(custom) => {
            if let Some(schema) = custom.input_schema() {
                if let Ok(compiled) = jsonschema::JSONSchema::compile(&schema) {
                    if !compiled.is_valid(&ctx.input) {
                        return Err(WorkflowError::NodeFailed(node.name.clone(), "input schema validation failed".into()));
                    }
                }
            }
            let result = AssertUnwindSafe(custom.execute(ctx.input.clone(), ctx)).catch_unwind().await;
            let output = match result {
                Ok(Ok(v)) => v,
                Ok(Err(e)) => return Err(WorkflowError::NodeFailed(node.name.clone(), e)),
                Err(_) => return Err(WorkflowError::NodeFailed(node.name.clone(), "node panicked".into())),
            };
            if let Some(schema) = custom.output_schema() {
                if let Ok(compiled) = jsonschema::JSONSchema::compile(&schema) {
                    if !compiled.is_valid(&output) {
                        return Err(WorkflowError::NodeFailed(node.name.clone(), "output schema validation failed".into()));
                    }
                }
            }
            ok(output)
        }
        NodeKind::Loop(config) => run_loop_node(&node.name, config, ctx).await,
    }
}

async fn run_llm_node(
    name: &str,
    config: &LlmNodeConfig,
    ctx: &WorkflowContext,
    events: Option<&mpsc::Sender<WorkflowEvent>>,
) -> Result<NodeOutcome, WorkflowError> {
    let messages = if let Some(prompt) = &config.prompt {
        vec![Message::user(prompt(ctx))]
    } else if let Some(messages_fn) = &config.messages {
        messages_fn(ctx).into_iter().filter(|m| !matches!(m, Message::System { .. })).collect()
    } else {
        vec![Message::user(ctx.input.to_string())]
    };

    let mut request = ChatRequest::new(messages);
    request.system_prompts = config.system_prompt.iter().cloned().collect();
    request.temperature = config.temperature;
    request.signal = ctx.signal.child();

    let mut rx = config.llm.chat(request);
    let mut content = String::new();
    while let Some(chunk) = rx.recv().await {
        match chunk {
            LlmChunk::Content(delta) => {
                content.push_str(&delta);
                if let Some(tx) = events {
                    let _ = tx.send(WorkflowEvent::LlmToken { name: name.to_string(), delta }).await;
                }
            }
            LlmChunk::ToolCall { .. } => {}
            LlmChunk::Done { .. } => break,
            LlmChunk::Error(e) => return Err(WorkflowError::NodeFailed(name.to_string(), e)),
        }
    }
    ok(Value::String(content))
}

async fn run_tool_node(config: &ToolNodeConfig, ctx: &WorkflowContext) -> Result<NodeOutcome, WorkflowError> {
    let args = config.input.as_ref().map(|f| f(ctx)).unwrap_or_else(|| ctx.input.clone());
    let tool_ctx = ToolContext::new(Uuid::new_v4().to_string(), ctx.signal.child());
    let result = AssertUnwindSafe(config.tool.execute(args, &tool_ctx)).catch_unwind().await;
    let data = match result {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => return Err(WorkflowError::NodeFailed(config.tool.name().to_string(), e)),
        Err(_) => return Err(WorkflowError::NodeFailed(config.tool.name().to_string(), "tool panicked".into())),
    };
    let output = config.transform.as_ref().map(|f| f(data.clone())).unwrap_or(data);
    ok(output)
}

async fn run_parallel_node(config: &ParallelNodeConfig, ctx: &WorkflowContext) -> Result<NodeOutcome, WorkflowError> {
    match &config.mode {
        ParallelMode::Fixed(branches) => {
            let items: Vec<Arc<WorkflowNode>> = branches.clone();
            run_bounded(items, ctx.clone(), config.max_concurrency, config.failure_policy, |node, ctx| {
                Box::pin(async move { execute_node(&node, &ctx, None).await.map(|o| o.output) })
            })
            .await
        }
        ParallelMode::ForEach { items, body } => {
            let values = items(ctx);
            let total = values.len() as u32;
            let bodies: Vec<(Arc<WorkflowNode>, Value, u32)> =
                values.into_iter().enumerate().map(|(i, v)| (body.clone(), v, i as u32)).collect();
            run_bounded(bodies, ctx.clone(), config.max_concurrency, config.failure_policy, move |(node, item, index), ctx| {
                Box::pin(async move {
                    let mut item_ctx = ctx.with_loop_state(loop_state(index, Some(total), None));
                    item_ctx.input = item;
                    execute_node(&node, &item_ctx, None).await.map(|o| o.output)
                })
            })
            .await
        }
    }
}

type BoundedFut = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, WorkflowError>> + Send>>;

/// Runs `items` through `run_one` with at most `max_concurrency` in flight at
/// once, preserving input order in the output regardless of completion
/// order. `All` aborts (returning the first failure) on any error; `Partial`
/// records failures per index and keeps the successes.
async fn run_bounded<T, F>(
    items: Vec<T>,
    ctx: WorkflowContext,
    max_concurrency: usize,
    failure_policy: FailurePolicy,
    run_one: F,
) -> Result<NodeOutcome, WorkflowError>
where
    T: Send + 'static,
    F: Fn(T, WorkflowContext) -> BoundedFut + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let run_one = Arc::new(run_one);
    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let semaphore = semaphore.clone();
        let ctx = ctx.clone();
        let run_one = run_one.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            run_one(item, ctx).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    let mut errors = HashMap::new();
    for (index, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await.unwrap_or_else(|_| Err(WorkflowError::NodeFailed(index.to_string(), "branch panicked".into())));
        match outcome {
            Ok(v) => results.push(Some(v)),
            Err(e) => {
                if failure_policy == FailurePolicy::All {
                    return Err(e);
                }
                errors.insert(index.to_string(), e.to_string());
                results.push(None);
            }
        }
    }

    let results_value: Vec<Value> = results.into_iter().map(|v| v.unwrap_or(Value::Null)).collect();
    let mut output = serde_json::json!({ "results": results_value });
    if !errors.is_empty() {
        output["errors"] = serde_json::json!(errors);
    }
    ok(output)
}

/// Builds the `loopState` value threaded into a loop body's context for one
/// iteration: `index`/`iteration` (0- and 1-based), `isFirst`/`isLast`, and
/// an optional accumulator snapshot. `total` is `None` when the iteration
/// count isn't known ahead of time (`while`/`until`), in which case
/// `isLast` is always `false` — the executor can't look ahead of a
/// predicate it hasn't evaluated yet.
fn loop_state(index: u32, total: Option<u32>, accumulator: Option<&Value>) -> Value {
    serde_json::json!({
        "index": index,
        "iteration": index + 1,
        "isFirst": index == 0,
        "isLast": total.map(|t| index + 1 >= t).unwrap_or(false),
        "accumulator": accumulator,
    })
}

async fn run_loop_node(name: &str, config: &LoopNodeConfig, ctx: &WorkflowContext) -> Result<NodeOutcome, WorkflowError> {
    let cap = config.max_iterations;
    match &config.kind {
        LoopKind::While { condition, body } => run_conditional_loop(name, body, cap, ctx, true, condition.clone()).await,
        LoopKind::Until { condition, body } => run_conditional_loop(name, body, cap, ctx, false, condition.clone()).await,
        LoopKind::Times { count, body } => {
            let total = (*count).min(cap);
            let mut results = Vec::new();
            for i in 0..total {
                let iter_ctx = ctx.with_loop_state(loop_state(i, Some(total), None));
                match body.run(None, &iter_ctx).await? {
                    LoopSignal::Continue(v) => results.push(v),
                    LoopSignal::Break(v) => {
                        if let Some(v) = v {
                            results.push(v);
                        }
                        break;
                    }
                }
            }
            ok(serde_json::json!({ "results": results }))
        }
        LoopKind::ForEach { items, body, concurrency } => {
            let values = items(ctx);
            let total = values.len() as u32;
            let mut results = Vec::new();
            let mut index = 0u32;
            'chunks: for chunk in values.chunks((*concurrency).max(1)) {
                let chunk_start = index;
                let signals = futures::future::join_all(chunk.iter().enumerate().map(|(offset, item)| {
                    let body = body.clone();
                    let item = item.clone();
                    let iter_ctx = ctx.with_loop_state(loop_state(chunk_start + offset as u32, Some(total), None));
                    async move { body.run(Some(item), &iter_ctx).await }
                }))
                .await;
                index += chunk.len() as u32;

                for signal in signals {
                    match signal? {
                        LoopSignal::Continue(v) => results.push(v),
                        LoopSignal::Break(v) => {
                            if let Some(v) = v {
                                results.push(v);
                            }
                            break 'chunks;
                        }
                    }
                    if results.len() as u32 >= cap {
                        break 'chunks;
                    }
                }
            }
            ok(serde_json::json!({ "results": results }))
        }
        LoopKind::Reduce { items, initial, reducer } => {
            let mut acc = initial.clone();
            for item in items(ctx) {
                acc = reducer(acc, item);
            }
            ok(acc)
        }
    }
}

async fn run_conditional_loop(
    _name: &str,
    body: &Arc<dyn LoopBody>,
    cap: u32,
    ctx: &WorkflowContext,
    test_before_run: bool,
    condition: PredicateFn,
) -> Result<NodeOutcome, WorkflowError> {
    let mut results = Vec::new();
    let mut iterations = 0;
    loop {
        if iterations >= cap {
            break;
        }
        if test_before_run && !condition(ctx) {
            break;
        }
        let iter_ctx = ctx.with_loop_state(loop_state(iterations, None, None));
        match body.run(None, &iter_ctx).await? {
            LoopSignal::Continue(v) => results.push(v),
            LoopSignal::Break(v) => {
                if let Some(v) = v {
                    results.push(v);
                }
                break;
            }
        }
        iterations += 1;
        if !test_before_run && condition(ctx) {
            break;
        }
    }
    ok(serde_json::json!({ "results": results }))
}
