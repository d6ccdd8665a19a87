//! The ReAct agent loop: bounded reasoning → acting → observing cycles over
//! a bound [`LlmAdapter`] and a [`ToolRegistry`].

mod coerce;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cancel::AbortSignal;
use crate::error::AgentError;
use crate::guardrail::GuardrailPipeline;
use crate::llm::{ChatRequest, LlmAdapter, LlmChunk};
use crate::message::{Message, ToolCall, ToolCallRecord, ToolResult, TokenUsage};
use crate::observability::{OpenSpan, SpanKind, SpanStatus, Tracer};
use crate::tools::{ToolContext, ToolRegistry};

pub use coerce::coerce_structured_output;

/// `reasoning → acting → observing → reasoning | done | errored`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxIterations,
    Error,
}

/// One chunk of an agent run's stream.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentStreamChunk {
    Content(String),
    ToolCallStart { id: String, name: String },
    ToolCallArgs { id: String, name: String, args_json: String },
    ToolCallEnd { id: String, name: String, arguments: Value },
    ToolResult { id: String, name: String, arguments: Value, result: ToolResult },
    Finish(Box<AgentRunResult>),
    Error(String),
}

/// Final, sealed outcome of a run. Mutated only by the loop; never touched
/// again once returned.
#[derive(Clone, Debug, Serialize)]
pub struct AgentRunResult {
    pub content: String,
    pub structured: Option<Value>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub usage: TokenUsage,
    pub duration_ms: u64,
    pub finish_reason: FinishReason,
    pub error: Option<String>,
    pub iterations: u32,
}

/// Everything bound at agent construction: prompt, adapter, tools, bounds.
#[derive(Clone)]
pub struct AgentConfig {
    pub system_prompt: Option<String>,
    pub llm: Arc<dyn LlmAdapter>,
    pub tools: Arc<ToolRegistry>,
    pub max_iterations: u32,
    pub temperature: Option<f32>,
    pub output_schema: Option<Value>,
    pub guardrails: Option<Arc<GuardrailPipeline>>,
    pub tracer: Option<Arc<Tracer>>,
}

impl AgentConfig {
    pub fn new(llm: Arc<dyn LlmAdapter>) -> Self {
        Self {
            system_prompt: None,
            llm,
            tools: Arc::new(ToolRegistry::new()),
            max_iterations: 5,
            temperature: None,
            output_schema: None,
            guardrails: None,
            tracer: None,
        }
    }
}

pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Runs to completion, collecting the full result without streaming
    /// intermediate chunks.
    pub async fn run(&self, input: impl Into<String>, signal: AbortSignal) -> AgentRunResult {
        let mut conversation = Vec::new();
        if let Some(prompt) = &self.config.system_prompt {
            conversation.push(Message::system(prompt.clone()));
        }
        conversation.push(Message::user(input.into()));
        self.run_conversation(conversation, signal, None).await
    }

    /// Runs over a caller-supplied message history (no implicit system/user
    /// wrapping — the caller owns the full conversation shape). The run is
    /// driven on its own task so the caller can drain `rx` concurrently.
    pub fn chat(self: Arc<Self>, messages: Vec<Message>, signal: AbortSignal) -> mpsc::Receiver<AgentStreamChunk> {
        self.stream_conversation(messages, signal)
    }

    pub fn stream(self: Arc<Self>, input: impl Into<String>, signal: AbortSignal) -> mpsc::Receiver<AgentStreamChunk> {
        let mut conversation = Vec::new();
        if let Some(prompt) = &self.config.system_prompt {
            conversation.push(Message::system(prompt.clone()));
        }
        conversation.push(Message::user(input.into()));
        self.stream_conversation(conversation, signal)
    }

    fn stream_conversation(self: Arc<Self>, conversation: Vec<Message>, signal: AbortSignal) -> mpsc::Receiver<AgentStreamChunk> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let result = self.run_conversation(conversation, signal, Some(tx.clone())).await;
            if let Some(err) = &result.error {
                let _ = tx.send(AgentStreamChunk::Error(err.clone())).await;
            }
            let _ = tx.send(AgentStreamChunk::Finish(Box::new(result))).await;
        });
        rx
    }

    async fn run_conversation(
        &self,
        conversation: Vec<Message>,
        signal: AbortSignal,
        stream_tx: Option<mpsc::Sender<AgentStreamChunk>>,
    ) -> AgentRunResult {
        let agent_span = self.config.tracer.as_ref().map(|t| t.start(SpanKind::Agent, "agent.run", None));
        let result = self.run_conversation_body(conversation, signal, stream_tx, agent_span.as_ref()).await;
        if let (Some(tracer), Some(span)) = (&self.config.tracer, agent_span) {
            let status = match &result.error {
                Some(e) => SpanStatus::Error(e.clone()),
                None => SpanStatus::Ok,
            };
            tracer.end(span, status).await;
        }
        result
    }

    async fn run_conversation_body(
        &self,
        mut conversation: Vec<Message>,
        signal: AbortSignal,
        stream_tx: Option<mpsc::Sender<AgentStreamChunk>>,
        agent_span: Option<&OpenSpan>,
    ) -> AgentRunResult {
        let start = Instant::now();
        let mut usage = TokenUsage::default();
        let mut tool_call_records = Vec::new();

        if let Some(guardrails) = &self.config.guardrails {
            let input_text: String = conversation.iter().filter_map(|m| m.text()).collect::<Vec<_>>().join("\n");
            let verdict = guardrails.run_input(&input_text).await;
            if !verdict.passed {
                return AgentRunResult {
                    content: String::new(),
                    structured: None,
                    tool_calls: tool_call_records,
                    usage,
                    duration_ms: start.elapsed().as_millis() as u64,
                    finish_reason: FinishReason::Error,
                    error: Some(format!("guardrail blocked input: {}", verdict.violations.join("; "))),
                    iterations: 0,
                };
            }
        }

        for iteration in 1..=self.config.max_iterations {
            if signal.is_aborted() {
                return AgentRunResult {
                    content: String::new(),
                    structured: None,
                    tool_calls: tool_call_records,
                    usage,
                    duration_ms: start.elapsed().as_millis() as u64,
                    finish_reason: FinishReason::Error,
                    error: Some("aborted".to_string()),
                    iterations: iteration - 1,
                };
            }

            let request = ChatRequest {
                messages: conversation.clone(),
                system_prompts: self.config.system_prompt.clone().into_iter().collect(),
                tools: self.config.tools.specs(),
                temperature: self.config.temperature,
                signal: signal.clone(),
            };

            let llm_span = self.config.tracer.as_ref().map(|t| t.start(SpanKind::Llm, "llm.chat", agent_span));
            let rx = self.config.llm.chat(request);
            let (assistant_content, calls, step_usage, adapter_error) =
                consume_adapter_stream(rx, &stream_tx).await;
            if let (Some(tracer), Some(span)) = (&self.config.tracer, llm_span) {
                let status = match &adapter_error {
                    Some(e) => SpanStatus::Error(e.clone()),
                    None => SpanStatus::Ok,
                };
                tracer.end(span, status).await;
            }

            if let Some(err) = adapter_error {
                return AgentRunResult {
                    content: assistant_content,
                    structured: None,
                    tool_calls: tool_call_records,
                    usage,
                    duration_ms: start.elapsed().as_millis() as u64,
                    finish_reason: FinishReason::Error,
                    error: Some(err),
                    iterations: iteration,
                };
            }

            if let Some(u) = step_usage {
                usage.add(&u);
            }

            if calls.is_empty() {
                let mut final_content = assistant_content;
                let mut guardrail_error = None;
                if let Some(guardrails) = &self.config.guardrails {
                    let verdict = guardrails.run_output(&final_content).await;
                    final_content = verdict.content;
                    if !verdict.passed {
                        guardrail_error = Some(format!("guardrail blocked output: {}", verdict.violations.join("; ")));
                    }
                }
                let structured = coerce_structured_output(&self.config.output_schema, &final_content);
                return AgentRunResult {
                    content: final_content,
                    structured,
                    tool_calls: tool_call_records,
                    usage,
                    duration_ms: start.elapsed().as_millis() as u64,
                    finish_reason: if guardrail_error.is_some() { FinishReason::Error } else { FinishReason::Stop },
                    error: guardrail_error,
                    iterations: iteration,
                };
            }

            let tool_calls: Vec<ToolCall> = calls
                .iter()
                .map(|(id, name, arguments)| ToolCall { id: id.clone(), name: name.clone(), arguments: arguments.clone() })
                .collect();
            conversation.push(Message::assistant(
                (!assistant_content.is_empty()).then_some(assistant_content),
                tool_calls.clone(),
            ));

            let results = dispatch_tool_calls(
                &self.config.tools,
                &tool_calls,
                &signal,
                &stream_tx,
                self.config.tracer.as_ref(),
                agent_span,
            )
            .await;
            for (call, result) in tool_calls.into_iter().zip(results) {
                conversation.push(Message::tool(call.id.clone(), call.name.clone(), Some(result.format_content())));
                if let Some(tx) = &stream_tx {
                    let _ = tx
                        .send(AgentStreamChunk::ToolResult {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            result: result.clone(),
                        })
                        .await;
                }
                tool_call_records.push(ToolCallRecord { call, result });
            }
        }

        debug!(iterations = self.config.max_iterations, "agent run hit max_iterations");
        AgentRunResult {
            content: String::new(),
            structured: None,
            tool_calls: tool_call_records,
            usage,
            duration_ms: start.elapsed().as_millis() as u64,
            finish_reason: FinishReason::MaxIterations,
            error: None,
            iterations: self.config.max_iterations,
        }
    }
}

async fn consume_adapter_stream(
    mut rx: mpsc::Receiver<LlmChunk>,
    stream_tx: &Option<mpsc::Sender<AgentStreamChunk>>,
) -> (String, Vec<(String, String, Value)>, Option<TokenUsage>, Option<String>) {
    // No stream to forward to: just collect the whole response in one pass.
    let Some(stream_tx) = stream_tx else {
        let collected = crate::llm::collect(rx).await;
        return (collected.content, collected.tool_calls, collected.usage, collected.error);
    };

    let mut content = String::new();
    let mut calls = Vec::new();
    let mut usage = None;
    let mut error = None;

    while let Some(chunk) = rx.recv().await {
        match chunk {
            LlmChunk::Content(delta) => {
                let _ = stream_tx.send(AgentStreamChunk::Content(delta.clone())).await;
                content.push_str(&delta);
            }
            LlmChunk::ToolCall { id, name, arguments } => {
                let _ = stream_tx.send(AgentStreamChunk::ToolCallStart { id: id.clone(), name: name.clone() }).await;
                let _ = stream_tx
                    .send(AgentStreamChunk::ToolCallArgs {
                        id: id.clone(),
                        name: name.clone(),
                        args_json: serde_json::to_string(&arguments).unwrap_or_default(),
                    })
                    .await;
                let _ = stream_tx
                    .send(AgentStreamChunk::ToolCallEnd { id: id.clone(), name: name.clone(), arguments: arguments.clone() })
                    .await;
                calls.push((id, name, arguments));
            }
            LlmChunk::Done { usage: u } => {
                usage = Some(u);
                break;
            }
            LlmChunk::Error(e) => {
                error = Some(e);
                break;
            }
        }
    }

    (content, calls, usage, error)
}

/// Dispatches tool calls concurrently; appends results in call-id
/// (registration) order regardless of completion order.
async fn dispatch_tool_calls(
    registry: &Arc<ToolRegistry>,
    calls: &[ToolCall],
    signal: &AbortSignal,
    stream_tx: &Option<mpsc::Sender<AgentStreamChunk>>,
    tracer: Option<&Arc<Tracer>>,
    parent: Option<&OpenSpan>,
) -> Vec<ToolResult> {
    let _ = stream_tx;
    let futures = calls.iter().map(|call| {
        let registry = registry.clone();
        let ctx = ToolContext::new(Uuid::new_v4().to_string(), signal.child());
        let name = call.name.clone();
        let id = call.id.clone();
        let arguments = call.arguments.clone();
        let span = tracer.map(|t| t.start(SpanKind::Tool, format!("tool.{name}"), parent));
        async move {
            let result = registry.execute(&name, id, arguments, &ctx).await;
            if let (Some(tracer), Some(span)) = (tracer, span) {
                let status = match &result.error {
                    Some(e) => SpanStatus::Error(e.clone()),
                    None => SpanStatus::Ok,
                };
                tracer.end(span, status).await;
            }
            result
        }
    });

    futures::future::join_all(futures).await
}

/// Formats one stream chunk as an SSE `data:` event. Pure formatting only —
/// no framing, no server.
pub fn to_sse_event(chunk: &AgentStreamChunk) -> String {
    format!("data: {}\n\n", serde_json::to_string(chunk).unwrap_or_default())
}

/// The terminal SSE event signaling the stream is closed.
pub fn sse_done_event() -> String {
    "data: [DONE]\n\n".to_string()
}

impl From<AgentError> for AgentStreamChunk {
    fn from(err: AgentError) -> Self {
        if err.is_recoverable_as_observation() {
            warn!(%err, "agent error treated as recoverable observation");
        }
        AgentStreamChunk::Error(err.to_string())
    }
}
