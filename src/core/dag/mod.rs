//! Dependency graphs of operator capability calls.
//!
//! A [`DagProject`] holds [`DagNode`]s (one operator capability call each) and edges
//! that forward a parent's result into a named argument of its child. The graph is
//! checked for cycles as edges are added, so execution never sees one.
//!
//! ```rust,ignore
//! let mut project = DagProject::new(CallOptions::new());
//! let left = project.add_node(DagNode::new("left", &researcher, "chat")?.with_arg("message", "..."))?;
//! let right = project.add_node(DagNode::new("right", &researcher, "chat")?.with_arg("message", "..."))?;
//! let merge = project.add_node(DagNode::new("merge", &editor, "combine")?)?;
//! project.add_edge(&left, &merge, "left")?;
//! project.add_edge(&right, &merge, "right")?;
//!
//! let mut run = project.execute()?;
//! while let Some(event) = run.next().await {
//!     println!("{} -> {:?}", event.node, event.status());
//! }
//! let report = run.finish().await?;
//! ```

mod executor;
mod graph;
mod mermaid;
mod node;

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::message::Message;

pub use executor::{DagExecution, ExecutionReport, NodeEvent, NodeOutcome};
pub use graph::{DagProject, EdgeView};
pub use mermaid::FlowchartDirection;
pub use node::DagNode;

/// Maps a parent's result to the value bound into the child.
pub type Transform = Arc<dyn Fn(&Message) -> Value + Send + Sync>;

/// Stable identifier of a node within its graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(String);

impl NodeKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeKey {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for NodeKey {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Lifecycle of a node during one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Waiting on parents, or never scheduled because the run was abandoned
    Pending,
    /// Capability call in flight
    Running,
    /// Finished with a message
    Completed,
    /// The capability call returned an error
    Failed,
    /// Not executed because an ancestor failed
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

/// Scheduling limits for graph execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Nodes allowed in flight at once (default: 8)
    pub max_concurrency: usize,
    /// Capacity of the event channel (default: 32)
    pub channel_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            channel_capacity: 32,
        }
    }
}

impl ExecutorConfig {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}
