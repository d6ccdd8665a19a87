//! A `RunConfigSummary` is a loggable, ordered snapshot of the settings an
//! agent or workflow run actually used — handy for support requests and
//! local debugging, where "what model/tools/limits were in effect" is the
//! first question.

/// One named group of key=value settings.
pub trait ConfigSection: Send + Sync {
    fn section_name(&self) -> &str;
    fn entries(&self) -> Vec<(&str, String)>;

    fn print_to_stderr(&self) {
        let rendered: Vec<String> = self.entries().into_iter().map(|(k, v)| format!("{k}={v}")).collect();
        eprintln!("[{}] {}", self.section_name(), rendered.join(" "));
    }
}

pub struct LlmConfigSummary {
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
}

impl ConfigSection for LlmConfigSummary {
    fn section_name(&self) -> &str {
        "Llm"
    }

    fn entries(&self) -> Vec<(&str, String)> {
        let mut entries = vec![("model", self.model.clone())];
        if let Some(base_url) = &self.base_url {
            entries.push(("base_url", base_url.clone()));
        }
        if let Some(temperature) = self.temperature {
            entries.push(("temperature", temperature.to_string()));
        }
        entries
    }
}

pub struct AgentConfigSummary {
    pub max_iterations: u32,
    pub has_output_schema: bool,
    pub has_guardrails: bool,
}

impl ConfigSection for AgentConfigSummary {
    fn section_name(&self) -> &str {
        "Agent"
    }

    fn entries(&self) -> Vec<(&str, String)> {
        vec![
            ("max_iterations", self.max_iterations.to_string()),
            ("output_schema", self.has_output_schema.to_string()),
            ("guardrails", self.has_guardrails.to_string()),
        ]
    }
}

pub struct ToolConfigSummary {
    pub tool_count: usize,
    pub tool_names: Vec<String>,
}

impl ConfigSection for ToolConfigSummary {
    fn section_name(&self) -> &str {
        "Tools"
    }

    fn entries(&self) -> Vec<(&str, String)> {
        vec![("count", self.tool_count.to_string()), ("names", self.tool_names.join(","))]
    }
}

pub struct RetrievalConfigSummary {
    pub collection: String,
    pub dimension: usize,
    pub hybrid_vector_weight: f32,
    pub hybrid_text_weight: f32,
}

impl ConfigSection for RetrievalConfigSummary {
    fn section_name(&self) -> &str {
        "Retrieval"
    }

    fn entries(&self) -> Vec<(&str, String)> {
        vec![
            ("collection", self.collection.clone()),
            ("dimension", self.dimension.to_string()),
            ("hybrid_vector_weight", self.hybrid_vector_weight.to_string()),
            ("hybrid_text_weight", self.hybrid_text_weight.to_string()),
        ]
    }
}

/// Ordered collection of sections, printed together so a run's full
/// configuration reads as one block rather than scattered log lines.
#[derive(Default)]
pub struct RunConfigSummary {
    sections: Vec<Box<dyn ConfigSection>>,
}

impl RunConfigSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_section(mut self, section: Box<dyn ConfigSection>) -> Self {
        self.sections.push(section);
        self
    }

    pub fn sections(&self) -> &[Box<dyn ConfigSection>] {
        &self.sections
    }

    pub fn print_to_stderr(&self) {
        for section in &self.sections {
            section.print_to_stderr();
        }
    }
}

/// Implemented by whatever owns the pieces a summary is built from (an
/// agent, a workflow runner) so `build_config_summary` stays generic over
/// the caller's actual config types.
pub trait RunConfigSummarySource {
    fn llm_summary(&self) -> Option<LlmConfigSummary>;
    fn agent_summary(&self) -> Option<AgentConfigSummary>;
    fn tool_summary(&self) -> Option<ToolConfigSummary>;
    fn retrieval_summary(&self) -> Option<RetrievalConfigSummary>;
}

pub fn build_config_summary(source: &dyn RunConfigSummarySource) -> RunConfigSummary {
    let mut summary = RunConfigSummary::new();
    if let Some(llm) = source.llm_summary() {
        summary = summary.with_section(Box::new(llm));
    }
    if let Some(agent) = source.agent_summary() {
        summary = summary.with_section(Box::new(agent));
    }
    if let Some(tools) = source.tool_summary() {
        summary = summary.with_section(Box::new(tools));
    }
    if let Some(retrieval) = source.retrieval_summary() {
        summary = summary.with_section(Box::new(retrieval));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource;

    impl RunConfigSummarySource for FakeSource {
        fn llm_summary(&self) -> Option<LlmConfigSummary> {
            Some(LlmConfigSummary { model: "test-model".into(), base_url: None, temperature: Some(0.2) })
        }

        fn agent_summary(&self) -> Option<AgentConfigSummary> {
            Some(AgentConfigSummary { max_iterations: 5, has_output_schema: false, has_guardrails: true })
        }

        fn tool_summary(&self) -> Option<ToolConfigSummary> {
            None
        }

        fn retrieval_summary(&self) -> Option<RetrievalConfigSummary> {
            None
        }
    }

    #[test]
    fn build_config_summary_includes_only_present_sections() {
        let summary = build_config_summary(&FakeSource);
        assert_eq!(summary.sections().len(), 2);
        assert_eq!(summary.sections()[0].section_name(), "Llm");
        assert_eq!(summary.sections()[1].section_name(), "Agent");
    }

    #[test]
    fn llm_summary_entries_include_temperature_when_set() {
        let section = LlmConfigSummary { model: "m".into(), base_url: Some("u".into()), temperature: Some(0.5) };
        let entries = section.entries();
        assert!(entries.contains(&("temperature", "0.5".to_string())));
        assert!(entries.contains(&("base_url", "u".to_string())));
    }
}
