//! Environment-driven configuration fallback and a loggable snapshot of a
//! run's effective settings.

mod summary;

pub use summary::{
    AgentConfigSummary, ConfigSection, LlmConfigSummary, RetrievalConfigSummary,
    RunConfigSummary, RunConfigSummarySource, ToolConfigSummary, build_config_summary,
};

use std::env;

/// Resolved adapter connection settings: explicit constructor arguments win,
/// environment variables fill in anything left `None`.
#[derive(Clone, Debug, Default)]
pub struct LlmAdapterConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl LlmAdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Fills any field left unset from the environment. Explicit values set
    /// via the builder methods above are never overwritten.
    pub fn resolved(mut self) -> Self {
        self.base_url = self.base_url.or_else(|| env_var("AGENTRT_LLM_BASE_URL"));
        self.api_key = self.api_key.or_else(|| env_var("AGENTRT_LLM_API_KEY"));
        self.model = self.model.or_else(|| env_var("AGENTRT_LLM_MODEL"));
        self
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
