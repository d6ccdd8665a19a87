//! LLM adapter abstraction: the boundary the agent loop talks to, not an
//! LLM provider SDK.
//!
//! An adapter's one operation is `chat`: given a request, it returns a
//! channel of [`LlmChunk`]s. Content chunks are total-ordered; tool-call
//! chunks arrive fully assembled (argument deltas are not forwarded at this
//! boundary); exactly one `Done` or one `Error` terminates the stream. An
//! adapter does not retry internally — retry around the adapter call lives
//! in [`crate::retry`].

mod http;
mod mock;

pub use http::HttpAdapter;
pub use mock::MockAdapter;

use tokio::sync::mpsc;

use crate::cancel::AbortSignal;
use crate::message::{Message, TokenUsage};
use crate::tools::ToolSpec;

/// One chunk of an adapter's streaming response.
#[derive(Clone, Debug)]
pub enum LlmChunk {
    /// A partial slice of assistant text.
    Content(String),
    /// A fully-assembled tool call (no argument-level deltas at this boundary).
    ToolCall { id: String, name: String, arguments: serde_json::Value },
    /// Terminal success.
    Done { usage: TokenUsage },
    /// Terminal failure.
    Error(String),
}

/// Everything needed to start one chat turn.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub system_prompts: Vec<String>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
    pub signal: AbortSignal,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            system_prompts: Vec::new(),
            tools: Vec::new(),
            temperature: None,
            signal: AbortSignal::new(),
        }
    }
}

/// An LLM provider boundary. `chat` starts the call and returns a receiver
/// immediately; the adapter drives the stream on its own task (or
/// synchronously before the first `recv`, for adapters like [`MockAdapter`]
/// that need no background work).
pub trait LlmAdapter: Send + Sync {
    fn chat(&self, request: ChatRequest) -> mpsc::Receiver<LlmChunk>;
}

/// Drains a chunk stream into one assembled response, honoring cancellation.
/// Used by callers (the agent loop) that want the collected result rather
/// than the raw stream.
pub struct CollectedResponse {
    pub content: String,
    pub tool_calls: Vec<(String, String, serde_json::Value)>,
    pub usage: Option<TokenUsage>,
    pub error: Option<String>,
}

pub async fn collect(mut rx: mpsc::Receiver<LlmChunk>) -> CollectedResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = None;
    let mut error = None;

    while let Some(chunk) = rx.recv().await {
        match chunk {
            LlmChunk::Content(delta) => content.push_str(&delta),
            LlmChunk::ToolCall { id, name, arguments } => tool_calls.push((id, name, arguments)),
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

    CollectedResponse { content, tool_calls, usage, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn collect_concatenates_content_and_stops_at_done() {
        let adapter = MockAdapter::responding_with("OK.", vec![], TokenUsage::new(3, 1));
        let rx = adapter.chat(ChatRequest::new(vec![Message::user("Say OK.")]));
        let collected = collect(rx).await;
        assert_eq!(collected.content, "OK.");
        assert!(collected.tool_calls.is_empty());
        assert_eq!(collected.usage.unwrap().total, 4);
        assert!(collected.error.is_none());
    }
}
