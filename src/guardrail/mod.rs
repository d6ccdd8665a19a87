//! Guardrail pipeline: an ordered chain of rules applied to input or output
//! content. Each rule passes, blocks, or transforms; guardrails carry no
//! policy of their own — the rules are injected by the caller.

use async_trait::async_trait;

/// What a rule does when it fires: let the content through unmodified, stop
/// the pipeline here, or rewrite the content for downstream rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleAction {
    Pass,
    Warn,
    Block,
    Redact,
}

/// Where in the pipeline a rule applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleScope {
    Input,
    Output,
    Both,
}

/// One rule's verdict on a piece of content.
#[derive(Clone, Debug)]
pub struct RuleOutcome {
    pub action: RuleAction,
    pub violations: Vec<String>,
    pub transformed_content: Option<String>,
}

impl RuleOutcome {
    pub fn pass() -> Self {
        Self { action: RuleAction::Pass, violations: Vec::new(), transformed_content: None }
    }

    pub fn block(violation: impl Into<String>) -> Self {
        Self { action: RuleAction::Block, violations: vec![violation.into()], transformed_content: None }
    }

    pub fn redact(transformed: impl Into<String>, violation: impl Into<String>) -> Self {
        Self {
            action: RuleAction::Redact,
            violations: vec![violation.into()],
            transformed_content: Some(transformed.into()),
        }
    }
}

/// A single guardrail rule.
#[async_trait]
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;
    fn scope(&self) -> RuleScope;
    async fn check(&self, content: &str) -> RuleOutcome;
}

/// The merged result of running a chain of rules over one piece of content.
#[derive(Clone, Debug)]
pub struct GuardrailResult {
    pub passed: bool,
    pub violations: Vec<String>,
    pub content: String,
}

/// An ordered chain of [`Rule`]s. Input rules run before the adapter is
/// called; output rules run symmetrically on the model's final content.
pub struct GuardrailPipeline {
    rules: Vec<Box<dyn Rule>>,
}

impl GuardrailPipeline {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    pub async fn run_input(&self, content: &str) -> GuardrailResult {
        self.run(content, RuleScope::Input).await
    }

    pub async fn run_output(&self, content: &str) -> GuardrailResult {
        self.run(content, RuleScope::Output).await
    }

    async fn run(&self, content: &str, scope: RuleScope) -> GuardrailResult {
        let mut current = content.to_string();
        let mut violations = Vec::new();

        for rule in &self.rules {
            if rule.scope() != scope && rule.scope() != RuleScope::Both {
                continue;
            }

            let outcome = rule.check(&current).await;
            violations.extend(outcome.violations);

            if let Some(transformed) = outcome.transformed_content {
                current = transformed;
            }

            if outcome.action == RuleAction::Block {
                return GuardrailResult { passed: false, violations, content: current };
            }
        }

        GuardrailResult { passed: true, violations, content: current }
    }
}
