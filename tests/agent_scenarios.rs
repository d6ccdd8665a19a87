//! End-to-end agent-loop scenarios spanning the llm/tools/message/agent
//! modules together, as opposed to the single-module unit tests colocated
//! with each of them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use agentrt::agent::{Agent, AgentConfig, AgentStreamChunk, FinishReason};
use agentrt::cancel::AbortSignal;
use agentrt::llm::{ChatRequest, LlmAdapter, LlmChunk};
use agentrt::message::TokenUsage;
use agentrt::tools::{Tool, ToolContext, ToolRegistry, ToolSpec};

/// Replays a different step on each successive call, the way a real model
/// would answer a tool result with a follow-up message.
struct ScriptedAdapter {
    steps: Vec<Vec<LlmChunk>>,
    call_count: AtomicUsize,
}

impl ScriptedAdapter {
    fn new(steps: Vec<Vec<LlmChunk>>) -> Self {
        Self { steps, call_count: AtomicUsize::new(0) }
    }
}

impl LlmAdapter for ScriptedAdapter {
    fn chat(&self, _request: ChatRequest) -> mpsc::Receiver<LlmChunk> {
        let step = self.call_count.fetch_add(1, Ordering::SeqCst);
        let chunks = self
            .steps
            .get(step)
            .or_else(|| self.steps.last())
            .cloned()
            .unwrap_or_else(|| vec![LlmChunk::Done { usage: TokenUsage::default() }]);
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for chunk in chunks {
                let _ = tx.send(chunk).await;
            }
        });
        rx
    }
}

struct Add;

#[async_trait]
impl Tool for Add {
    fn name(&self) -> &str {
        "add"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "add".into(),
            description: "adds two numbers".into(),
            input_schema: json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"],
            }),
            timeout: None,
            retry: None,
            requires_approval: false,
        }
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, String> {
        Ok(json!(args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0)))
    }
}

/// Sleeps, then returns `{v:1}` — used to prove tool-result ordering
/// follows registration order, not completion order.
struct Slow;

#[async_trait]
impl Tool for Slow {
    fn name(&self) -> &str {
        "slow"
    }
    fn spec(&self) -> ToolSpec {
        ToolSpec { name: "slow".into(), description: String::new(), input_schema: json!({}), timeout: None, retry: None, requires_approval: false }
    }
    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, String> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(json!({"v": 1}))
    }
}

struct Fast;

#[async_trait]
impl Tool for Fast {
    fn name(&self) -> &str {
        "fast"
    }
    fn spec(&self) -> ToolSpec {
        ToolSpec { name: "fast".into(), description: String::new(), input_schema: json!({}), timeout: None, retry: None, requires_approval: false }
    }
    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, String> {
        Ok(json!({"v": 2}))
    }
}

struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }
    fn spec(&self) -> ToolSpec {
        ToolSpec { name: "echo".into(), description: String::new(), input_schema: json!({}), timeout: None, retry: None, requires_approval: false }
    }
    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, String> {
        Ok(json!({"done": false}))
    }
}

#[tokio::test]
async fn single_tool_call_then_final_answer() {
    let adapter = ScriptedAdapter::new(vec![
        vec![
            LlmChunk::ToolCall { id: "t1".into(), name: "add".into(), arguments: json!({"a": 2, "b": 3}) },
            LlmChunk::Done { usage: TokenUsage::default() },
        ],
        vec![LlmChunk::Content("5".into()), LlmChunk::Done { usage: TokenUsage::default() }],
    ]);

    let mut config = AgentConfig::new(Arc::new(adapter));
    config.tools = Arc::new(ToolRegistry::with_tools(vec![Arc::new(Add)]));
    let agent = Agent::new(config);

    let result = agent.run("2 plus 3?", AbortSignal::new()).await;

    assert_eq!(result.content, "5");
    assert_eq!(result.finish_reason, FinishReason::Stop);
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].call.id, "t1");
    assert!(result.tool_calls[0].result.success);
    assert_eq!(result.tool_calls[0].result.data, Some(json!(5.0)));
}

#[tokio::test]
async fn parallel_tools_record_results_in_registration_order_not_completion_order() {
    let adapter = ScriptedAdapter::new(vec![
        vec![
            LlmChunk::ToolCall { id: "t1".into(), name: "slow".into(), arguments: json!({}) },
            LlmChunk::ToolCall { id: "t2".into(), name: "fast".into(), arguments: json!({}) },
            LlmChunk::Done { usage: TokenUsage::default() },
        ],
        vec![LlmChunk::Content("done".into()), LlmChunk::Done { usage: TokenUsage::default() }],
    ]);

    let mut config = AgentConfig::new(Arc::new(adapter));
    config.tools = Arc::new(ToolRegistry::with_tools(vec![Arc::new(Slow), Arc::new(Fast)]));
    let agent = Agent::new(config);

    let result = agent.run("go", AbortSignal::new()).await;

    assert_eq!(result.tool_calls.len(), 2);
    assert_eq!(result.tool_calls[0].call.id, "t1");
    assert_eq!(result.tool_calls[1].call.id, "t2");
    assert_eq!(result.tool_calls[0].result.data, Some(json!({"v": 1})));
    assert_eq!(result.tool_calls[1].result.data, Some(json!({"v": 2})));
}

#[tokio::test]
async fn stream_emits_tool_call_then_tool_result_then_content_then_finish() {
    let adapter = ScriptedAdapter::new(vec![
        vec![
            LlmChunk::ToolCall { id: "t1".into(), name: "add".into(), arguments: json!({"a": 2, "b": 3}) },
            LlmChunk::Done { usage: TokenUsage::default() },
        ],
        vec![LlmChunk::Content("5".into()), LlmChunk::Done { usage: TokenUsage::default() }],
    ]);

    let mut config = AgentConfig::new(Arc::new(adapter));
    config.tools = Arc::new(ToolRegistry::with_tools(vec![Arc::new(Add)]));
    let agent = Arc::new(Agent::new(config));

    let mut rx = agent.stream("2 plus 3?", AbortSignal::new());
    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }

    let kinds: Vec<&str> = chunks
        .iter()
        .map(|c| match c {
            AgentStreamChunk::Content(_) => "content",
            AgentStreamChunk::ToolCallStart { .. } => "tool_call_start",
            AgentStreamChunk::ToolCallArgs { .. } => "tool_call_args",
            AgentStreamChunk::ToolCallEnd { .. } => "tool_call_end",
            AgentStreamChunk::ToolResult { .. } => "tool_result",
            AgentStreamChunk::Finish(_) => "finish",
            AgentStreamChunk::Error(_) => "error",
        })
        .collect();

    assert_eq!(
        kinds,
        vec!["tool_call_start", "tool_call_args", "tool_call_end", "tool_result", "content", "finish"]
    );

    match &chunks[3] {
        AgentStreamChunk::ToolResult { id, name, result, .. } => {
            assert_eq!(id, "t1");
            assert_eq!(name, "add");
            assert!(result.success);
            assert_eq!(result.data, Some(json!(5.0)));
        }
        other => panic!("expected tool_result, got {other:?}"),
    }

    match &chunks[4] {
        AgentStreamChunk::Content(delta) => assert_eq!(delta, "5"),
        other => panic!("expected content, got {other:?}"),
    }

    match chunks.last().unwrap() {
        AgentStreamChunk::Finish(result) => {
            assert_eq!(result.content, "5");
            assert_eq!(result.finish_reason, FinishReason::Stop);
            assert_eq!(result.tool_calls.len(), 1);
        }
        other => panic!("expected finish, got {other:?}"),
    }
}

/// A stream that would emit more than the channel's buffer capacity of
/// chunks must not deadlock: the caller drains concurrently with the run
/// driving on its own task rather than after the run completes.
#[tokio::test]
async fn stream_with_more_chunks_than_channel_capacity_does_not_deadlock() {
    let content_chunks: Vec<LlmChunk> =
        (0..200).map(|i| LlmChunk::Content(i.to_string())).chain(std::iter::once(LlmChunk::Done { usage: TokenUsage::default() })).collect();
    let adapter = ScriptedAdapter::new(vec![content_chunks]);

    let config = AgentConfig::new(Arc::new(adapter));
    let agent = Arc::new(Agent::new(config));

    let rx = agent.stream("go", AbortSignal::new());
    let result = tokio::time::timeout(Duration::from_secs(5), async move {
        let mut rx = rx;
        let mut received = 0;
        let mut finished = false;
        while let Some(chunk) = rx.recv().await {
            received += 1;
            if matches!(chunk, AgentStreamChunk::Finish(_)) {
                finished = true;
            }
        }
        (received, finished)
    })
    .await
    .expect("stream must not deadlock");

    assert!(result.1, "stream must terminate with finish");
    assert_eq!(result.0, 201);
}

#[tokio::test]
async fn max_iterations_stops_with_empty_content_and_no_error() {
    let adapter = ScriptedAdapter::new(vec![vec![
        LlmChunk::ToolCall { id: "c1".into(), name: "echo".into(), arguments: json!({}) },
        LlmChunk::Done { usage: TokenUsage::default() },
    ]]);

    let mut config = AgentConfig::new(Arc::new(adapter));
    config.max_iterations = 3;
    config.tools = Arc::new(ToolRegistry::with_tools(vec![Arc::new(Echo)]));
    let agent = Agent::new(config);

    let result = agent.run("loop forever", AbortSignal::new()).await;

    assert_eq!(result.iterations, 3);
    assert_eq!(result.tool_calls.len(), 3);
    assert_eq!(result.finish_reason, FinishReason::MaxIterations);
    assert_eq!(result.content, "");
    assert!(result.error.is_none());
}
