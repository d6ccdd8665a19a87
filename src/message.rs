//! Conversation data model: [`Message`], [`ToolCall`], [`ToolResult`],
//! [`TokenUsage`].

use serde::{Deserialize, Serialize};

/// One message in a conversation. Role-discriminated sum type (a tagged
/// union, not a class hierarchy) — tool-call ids are the join key between
/// the assistant variant (which lists calls) and the tool variant (which
/// answers one call).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: Option<String>,
        tool_call_id: String,
        name: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User { content: content.into() }
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant { content, tool_calls }
    }

    pub fn tool(tool_call_id: impl Into<String>, name: impl Into<String>, content: Option<String>) -> Self {
        Message::Tool { content, tool_call_id: tool_call_id.into(), name: name.into() }
    }

    /// Plain-text content, when this message carries any (empty string for
    /// an assistant message with only tool calls).
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::System { content } | Message::User { content } => Some(content.as_str()),
            Message::Assistant { content, .. } => content.as_deref(),
            Message::Tool { content, .. } => content.as_deref(),
        }
    }
}

/// A single, stable-id tool invocation requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Arguments as a validated structured value (post schema-validation).
    pub arguments: serde_json::Value,
}

/// Pairs a [`ToolCall`] id with its outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolResult {
    /// Renders the result into tool-message content: the JSON-serialized
    /// `data` on success, or `Error: <error>` on failure. No binary content
    /// crosses this boundary.
    pub fn format_content(&self) -> String {
        if self.success {
            self.data
                .as_ref()
                .map(|d| serde_json::to_string(d).unwrap_or_default())
                .unwrap_or_default()
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("unknown"))
        }
    }
}

/// One (call, result) pair as recorded in an [`crate::agent::AgentRunResult`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call: ToolCall,
    pub result: ToolResult,
}

/// Token accounting. Usage accumulates monotonically over a run by
/// pointwise addition; `total == prompt + completion` is maintained by
/// construction.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self { prompt, completion, total: prompt + completion }
    }

    /// Pointwise addition, used to accumulate usage across loop iterations.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt += other.prompt;
        self.completion += other.completion;
        self.total += other.total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates_pointwise() {
        let mut total = TokenUsage::default();
        total.add(&TokenUsage::new(3, 1));
        total.add(&TokenUsage::new(2, 5));
        assert_eq!(total, TokenUsage { prompt: 5, completion: 6, total: 11 });
    }

    #[test]
    fn tool_result_formats_success_as_json_and_failure_as_error_line() {
        let ok = ToolResult {
            id: "t1".into(),
            name: "add".into(),
            success: true,
            data: Some(serde_json::json!(5)),
            error: None,
            duration_ms: 1,
        };
        assert_eq!(ok.format_content(), "5");

        let err = ToolResult {
            id: "t1".into(),
            name: "add".into(),
            success: false,
            data: None,
            error: Some("boom".into()),
            duration_ms: 1,
        };
        assert_eq!(err.format_content(), "Error: boom");
    }
}
