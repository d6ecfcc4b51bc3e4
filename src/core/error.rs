use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::llm::error::LLMError;

/// Crate-wide result alias.
pub type Result<T, E = OrchestrationError> = std::result::Result<T, E>;

/// Everything that can go wrong while wiring or running operators, tools and graphs.
///
/// Graph-structure variants (`CycleDetected`, `DependencyUnresolved`, `DuplicateNode`,
/// `DuplicateBinding`) are only ever produced while the graph is being built.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrchestrationError {
    #[error("Response does not match format '{format}': {reason}")]
    SchemaValidation { format: String, reason: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Method '{method}' not found on tool '{tool}'")]
    MethodNotFound { tool: String, method: String },

    #[error("Invalid arguments for {target}: {reason}")]
    InvalidArguments { target: String, reason: String },

    #[error("Tool loop exceeded {limit} iterations")]
    ToolLoopExceeded { limit: usize },

    #[error("Edge {parent} -> {child} would create a cycle")]
    CycleDetected { parent: String, child: String },

    #[error("Node '{0}' is not part of the graph")]
    DependencyUnresolved(String),

    #[error("Delegated task {task_id} did not finish within {timeout:?}")]
    DelegationTimeout { task_id: Uuid, timeout: Duration },

    #[error("Delegated task failed: {0}")]
    Delegation(String),

    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Method '{method}' declared twice on tool '{tool}'")]
    DuplicateMethod { tool: String, method: String },

    #[error("Node '{0}' is already in the graph")]
    DuplicateNode(String),

    #[error("Node '{child}' already receives a binding named '{binding}'")]
    DuplicateBinding { child: String, binding: String },

    #[error("Operator '{operator}' has no capability '{capability}'")]
    UnknownCapability { operator: String, capability: String },

    #[error("Operator '{0}' is not registered")]
    UnknownOperator(String),

    #[error("Client '{0}' is not registered")]
    UnknownClient(String),

    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    #[error("No node completed; failed nodes: {failed:?}")]
    GraphFailed { failed: Vec<String> },

    #[error("Graph executor stopped: {0}")]
    ExecutorStopped(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Llm(#[from] LLMError),
}

impl OrchestrationError {
    pub(crate) fn invalid_args(target: impl Into<String>, reason: impl Into<String>) -> Self {
        OrchestrationError::InvalidArguments {
            target: target.into(),
            reason: reason.into(),
        }
    }
}
