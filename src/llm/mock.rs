use tokio::sync::mpsc;

use super::{ChatRequest, LlmAdapter, LlmChunk};
use crate::message::TokenUsage;

/// A scripted adapter for tests: replays a fixed sequence of content chunks,
/// tool calls, and a final usage total, honoring cancellation like a real
/// adapter would.
#[derive(Clone, Debug)]
pub struct MockAdapter {
    content_chunks: Vec<String>,
    tool_calls: Vec<(String, String, serde_json::Value)>,
    usage: TokenUsage,
    fail_with: Option<String>,
}

impl MockAdapter {
    /// Streams `content` as a single chunk.
    pub fn responding_with(
        content: impl Into<String>,
        tool_calls: Vec<(String, String, serde_json::Value)>,
        usage: TokenUsage,
    ) -> Self {
        Self { content_chunks: vec![content.into()], tool_calls, usage, fail_with: None }
    }

    /// Streams each element of `chunks` as its own `Content` chunk, in order.
    pub fn streaming_chunks(
        chunks: Vec<String>,
        tool_calls: Vec<(String, String, serde_json::Value)>,
        usage: TokenUsage,
    ) -> Self {
        Self { content_chunks: chunks, tool_calls, usage, fail_with: None }
    }

    /// Emits a single `Error` chunk and nothing else.
    pub fn failing(err: impl Into<String>) -> Self {
        Self {
            content_chunks: Vec::new(),
            tool_calls: Vec::new(),
            usage: TokenUsage::default(),
            fail_with: Some(err.into()),
        }
    }
}

impl LlmAdapter for MockAdapter {
    fn chat(&self, request: ChatRequest) -> mpsc::Receiver<LlmChunk> {
        let (tx, rx) = mpsc::channel(32);
        let adapter = self.clone();

        tokio::spawn(async move {
            if let Some(err) = adapter.fail_with {
                let _ = tx.send(LlmChunk::Error(err)).await;
                return;
            }

            for content in adapter.content_chunks {
                if request.signal.is_aborted() {
                    let _ = tx.send(LlmChunk::Error("aborted".to_string())).await;
                    return;
                }
                let _ = tx.send(LlmChunk::Content(content)).await;
            }

            for (id, name, arguments) in adapter.tool_calls {
                if request.signal.is_aborted() {
                    let _ = tx.send(LlmChunk::Error("aborted".to_string())).await;
                    return;
                }
                let _ = tx.send(LlmChunk::ToolCall { id, name, arguments }).await;
            }

            let _ = tx.send(LlmChunk::Done { usage: adapter.usage }).await;
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn aborted_signal_yields_error_chunk_instead_of_content() {
        let adapter = MockAdapter::streaming_chunks(
            vec!["a".into(), "b".into()],
            vec![],
            TokenUsage::default(),
        );
        let signal = crate::cancel::AbortSignal::new();
        signal.abort();
        let mut request = ChatRequest::new(vec![Message::user("hi")]);
        request.signal = signal;

        let mut rx = adapter.chat(request);
        match rx.recv().await {
            Some(LlmChunk::Error(_)) => {}
            other => panic!("expected Error chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_adapter_emits_only_an_error_chunk() {
        let adapter = MockAdapter::failing("boom");
        let mut rx = adapter.chat(ChatRequest::new(vec![Message::user("hi")]));
        match rx.recv().await {
            Some(LlmChunk::Error(e)) => assert_eq!(e, "boom"),
            other => panic!("expected Error chunk, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }
}
