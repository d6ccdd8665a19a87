//! Generic OpenAI-compatible HTTP adapter: POSTs a chat-completions request
//! with `stream: true` and parses server-sent events from the response body.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{ChatRequest, LlmAdapter, LlmChunk};
use crate::message::{Message, TokenUsage};

#[derive(Clone, Debug)]
pub struct HttpAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpAdapter {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), api_key, model: model.into() }
    }
}

impl LlmAdapter for HttpAdapter {
    fn chat(&self, request: ChatRequest) -> mpsc::Receiver<LlmChunk> {
        let (tx, rx) = mpsc::channel(64);
        let adapter = self.clone();

        tokio::spawn(async move {
            if let Err(e) = run(&adapter, request, &tx).await {
                let _ = tx.send(LlmChunk::Error(e)).await;
            }
        });

        rx
    }
}

async fn run(adapter: &HttpAdapter, request: ChatRequest, tx: &mpsc::Sender<LlmChunk>) -> Result<(), String> {
    let mut messages: Vec<WireMessage> =
        request.system_prompts.iter().map(|s| WireMessage::system(s.clone())).collect();
    messages.extend(request.messages.iter().map(to_wire_message));

    let tools: Vec<WireTool> = request
        .tools
        .iter()
        .map(|spec| WireTool {
            r#type: "function".to_string(),
            function: WireFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.input_schema.clone(),
            },
        })
        .collect();

    let body = WireRequest {
        model: adapter.model.clone(),
        messages,
        temperature: request.temperature,
        tools: if tools.is_empty() { None } else { Some(tools) },
        stream: true,
    };

    let mut req = adapter.client.post(format!("{}/chat/completions", adapter.base_url)).json(&body);
    if let Some(key) = &adapter.api_key {
        req = req.bearer_auth(key);
    }

    let response = tokio::select! {
        r = req.send() => r.map_err(|e| e.to_string())?,
        _ = request.signal.cancelled() => return Err("aborted".to_string()),
    };

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(format!("http {status}: {text}"));
    }

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut accumulated_tool_calls: Vec<AccumulatingToolCall> = Vec::new();
    let mut usage = TokenUsage::default();

    use futures::StreamExt;
    loop {
        let next = tokio::select! {
            chunk = stream.next() => chunk,
            _ = request.signal.cancelled() => return Err("aborted".to_string()),
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| e.to_string())?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find("\n\n") {
            let event = buffer[..pos].to_string();
            buffer.drain(..pos + 2);
            process_event(&event, tx, &mut accumulated_tool_calls, &mut usage).await?;
        }
    }

    if !buffer.trim().is_empty() {
        process_event(&buffer, tx, &mut accumulated_tool_calls, &mut usage).await?;
    }

    for call in accumulated_tool_calls {
        let arguments: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
        let _ = tx
            .send(LlmChunk::ToolCall { id: call.id, name: call.name, arguments })
            .await;
    }

    let _ = tx.send(LlmChunk::Done { usage }).await;
    Ok(())
}

async fn process_event(
    event: &str,
    tx: &mpsc::Sender<LlmChunk>,
    accumulated_tool_calls: &mut Vec<AccumulatingToolCall>,
    usage: &mut TokenUsage,
) -> Result<(), String> {
    for line in event.lines() {
        let Some(data) = line.trim().strip_prefix("data: ") else { continue };
        if data == "[DONE]" {
            continue;
        }
        let parsed: WireStreamChunk = match serde_json::from_str(data) {
            Ok(p) => p,
            Err(_) => continue,
        };

        for choice in parsed.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    let _ = tx.send(LlmChunk::Content(content)).await;
                }
            }
            if let Some(deltas) = choice.delta.tool_calls {
                for delta in deltas {
                    let index = delta.index;
                    while accumulated_tool_calls.len() <= index {
                        accumulated_tool_calls.push(AccumulatingToolCall::default());
                    }
                    let entry = &mut accumulated_tool_calls[index];
                    if let Some(id) = delta.id {
                        entry.id = id;
                    }
                    if let Some(function) = delta.function {
                        if let Some(name) = function.name {
                            entry.name = name;
                        }
                        if let Some(args) = function.arguments {
                            entry.arguments.push_str(&args);
                        }
                    }
                }
            }
        }

        if let Some(u) = parsed.usage {
            *usage = TokenUsage::new(u.prompt_tokens as u64, u.completion_tokens as u64);
        }
    }
    Ok(())
}

#[derive(Default)]
struct AccumulatingToolCall {
    id: String,
    name: String,
    arguments: String,
}

fn to_wire_message(message: &Message) -> WireMessage {
    match message {
        Message::System { content } => WireMessage::system(content.clone()),
        Message::User { content } => {
            WireMessage { role: "user".into(), content: Some(content.clone()), tool_calls: None, tool_call_id: None, name: None }
        }
        Message::Assistant { content, tool_calls } => WireMessage {
            role: "assistant".into(),
            content: content.clone(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(
                    tool_calls
                        .iter()
                        .map(|c| WireToolCall {
                            id: c.id.clone(),
                            r#type: "function".into(),
                            function: WireFunctionCall {
                                name: c.name.clone(),
                                arguments: serde_json::to_string(&c.arguments).unwrap_or_default(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: None,
            name: None,
        },
        Message::Tool { content, tool_call_id, name } => WireMessage {
            role: "tool".into(),
            content: content.clone(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
            name: Some(name.clone()),
        },
    }
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl WireMessage {
    fn system(content: String) -> Self {
        Self { role: "system".into(), content: Some(content), tool_calls: None, tool_call_id: None, name: None }
    }
}

#[derive(Serialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    r#type: String,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Deserialize)]
struct WireStreamChunk {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    delta: WireDelta,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize, Clone, Copy)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
