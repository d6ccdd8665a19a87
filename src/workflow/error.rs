use thiserror::Error;

/// Workflow-specific failure taxonomy. Construction-time problems
/// (`CompilationError` et al. in the agent/tool layers have their own
/// analogues) are always fatal and raised before any node runs; execution
/// errors are carried in the result rather than panicking.
#[derive(Debug, Error, Clone)]
pub enum WorkflowError {
    #[error("duplicate node name: {0}")]
    DuplicateNodeName(String),

    #[error("edge references unknown node: {0}")]
    UnresolvedEdge(String),

    #[error("start node not found: {0}")]
    MissingStartNode(String),

    #[error("graph contains a cycle through node: {0}")]
    Cycle(String),

    #[error("node '{0}' failed: {1}")]
    NodeFailed(String, String),

    #[error("aborted")]
    Aborted,
}
