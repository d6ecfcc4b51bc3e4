//! # Ensemble
//!
//! Task-graph orchestration for language-model agents.
//!
//! ## Features
//!
//! - **Operators**: agents whose capabilities render prompts (or run plain Rust) and whose
//!   completions are validated against a declared [`MessageFormat`]
//! - **Tools**: typed method descriptors, dispatched when a model asks for them
//! - **Graphs**: [`DagProject`] runs capability calls in dependency order, forwarding
//!   results along edges and streaming each node's outcome as it lands
//! - **Projects**: a linear plan/implement/integrate loop between an executive and a developer
//! - **Delegation**: hand calls to a [`TaskQueue`] and await them through a handle
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ensemble::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> ensemble::Result<()> {
//! let client = Arc::new(ScriptedClient::new("scripted").respond("Hello!"));
//! let assistant = roles::generic(Operator::builder("Assistant"))
//!     .client("scripted", client)
//!     .build()?;
//!
//! let reply = assistant
//!     .invoke("chat", Arguments::new().with("message", json!("Hi")), CallOptions::new())
//!     .await?;
//! assert_eq!(reply.as_text(), Some("Hello!"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`llm`]: the model client seam and an offline [`ScriptedClient`]
//! - [`roles`]: the built-in executive, developer and generic operators
//! - [`formats`]: the built-in message formats
//! - [`prelude`]: commonly used types (import with `use ensemble::prelude::*`)

// ============================================================================
// Core Module
// ============================================================================

mod core;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

// Errors and values
pub use crate::core::arguments::Arguments;
pub use crate::core::error::{OrchestrationError, Result};
pub use crate::core::message::{
    Field, FieldKind, Message, MessageFormat, Param, TEXT_FORMAT, ToolCall, ValidationIssue,
    ValidationReport, formats,
};

// Tools
pub use crate::core::tool::{
    Arithmetic, MethodDescriptor, ParamKind, ParamSpec, Tool, ToolBuilder, ToolRegistry,
};

// Operators
pub use crate::core::operator::{
    CallOptions, CallOutcome, CallPhase, Capability, Operator, OperatorBuilder, OperatorConfig,
    roles,
};

// Delegation and storage
pub use crate::core::delegation::{
    DelegationHandle, DelegationSender, LocalTaskQueue, TaskQueue, UnitOfWork,
};
pub use crate::core::store::{MemoryMessageStore, MessageStore, StoreError, StoredMessage};

// Graphs
pub use crate::core::dag::{
    DagExecution, DagNode, DagProject, EdgeView, ExecutionReport, ExecutorConfig,
    FlowchartDirection, NodeEvent, NodeKey, NodeOutcome, NodeStatus, Transform,
};

// Projects
pub use crate::core::orchestrator::{
    DEVELOPER_TITLE, EXECUTIVE_TITLE, HELLO_WORLD_PROMPT, Orchestrator, ProjectRoles,
};
pub use crate::core::project::{
    Project, ProjectConfig, ProjectEvent, ProjectPhase, ProjectRun, ProjectStatus,
};

// ============================================================================
// Prelude Modules - Convenient Bulk Imports
// ============================================================================

/// The main prelude: everything needed to wire operators, tools and graphs.
///
/// # Example
/// ```rust
/// use ensemble::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        Arguments,
        CallOptions,
        // Graphs
        DagNode,
        DagProject,
        ExecutorConfig,
        // Models
        LanguageModelClient,
        Message,
        MessageFormat,
        NodeEvent,
        NodeOutcome,
        NodeStatus,
        // Operators
        Operator,
        OperatorConfig,
        OrchestrationError,
        // Projects
        Orchestrator,
        ProjectConfig,
        ProjectRoles,
        ScriptedClient,
        // Tools
        Tool,
        ToolRegistry,
        formats,
        roles,
    };
    pub use futures::StreamExt;
}

// ============================================================================
// LLM
// ============================================================================

pub mod llm;

pub use llm::{
    ChatMessage, CompletionRequest, LanguageModelClient, Role, ScriptedClient, error::LLMError,
};

// ============================================================================
// Re-export commonly used external types for convenience
// ============================================================================

pub use serde_json::Value as JsonValue;

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
