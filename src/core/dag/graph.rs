use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde_json::Value;
use uuid::Uuid;

use crate::core::dag::executor::{self, DagExecution};
use crate::core::dag::{DagNode, ExecutorConfig, NodeKey, Transform};
use crate::core::error::{OrchestrationError, Result};
use crate::core::message::Message;
use crate::core::operator::CallOptions;

pub(super) struct Edge {
    pub(super) child: usize,
    pub(super) binding: String,
    pub(super) transform: Option<Transform>,
}

impl Edge {
    /// The value bound into the child: the transform's output, or the message content.
    pub(super) fn apply(&self, message: &Message) -> Value {
        match &self.transform {
            Some(transform) => transform(message),
            None => message.content(),
        }
    }
}

/// A borrowed view of one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeView<'a> {
    pub parent: &'a str,
    pub child: &'a str,
    pub binding: &'a str,
    pub transformed: bool,
}

/// A graph of operator capability calls whose results feed one another.
///
/// Nodes keep their insertion order, which is also the tie-break order for scheduling
/// and rendering.
pub struct DagProject {
    id: Uuid,
    pub(super) nodes: Vec<DagNode>,
    index: HashMap<NodeKey, usize>,
    pub(super) edges: Vec<Vec<Edge>>,
    pub(super) options: CallOptions,
    pub(super) config: ExecutorConfig,
}

impl DagProject {
    /// An empty graph; `options` apply to every node unless the node overrides them.
    pub fn new(options: CallOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            options,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, key: impl AsRef<str>) -> Option<&DagNode> {
        self.index.get(key.as_ref()).map(|&i| &self.nodes[i])
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &DagNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> {
        self.edges.iter().enumerate().flat_map(move |(parent, out)| {
            out.iter().map(move |edge| EdgeView {
                parent: self.nodes[parent].name(),
                child: self.nodes[edge.child].name(),
                binding: &edge.binding,
                transformed: edge.transform.is_some(),
            })
        })
    }

    pub fn add_node(&mut self, node: DagNode) -> Result<NodeKey> {
        let key = NodeKey::new(node.name());
        if self.index.contains_key(&key) {
            return Err(OrchestrationError::DuplicateNode(key.to_string()));
        }
        log::debug!("Adding node '{}' ({})", key, node.label());
        self.index.insert(key.clone(), self.nodes.len());
        self.nodes.push(node);
        self.edges.push(Vec::new());
        Ok(key)
    }

    /// Forward `parent`'s result into `child` as the argument `binding`.
    pub fn add_edge(
        &mut self,
        parent: impl AsRef<str>,
        child: impl AsRef<str>,
        binding: impl Into<String>,
    ) -> Result<()> {
        self.insert_edge(parent.as_ref(), child.as_ref(), binding.into(), None)
    }

    /// Like [`add_edge`](Self::add_edge) but binds `transform(result)` instead.
    pub fn add_edge_with<F>(
        &mut self,
        parent: impl AsRef<str>,
        child: impl AsRef<str>,
        binding: impl Into<String>,
        transform: F,
    ) -> Result<()>
    where
        F: Fn(&Message) -> Value + Send + Sync + 'static,
    {
        let transform: Transform = std::sync::Arc::new(transform);
        self.insert_edge(parent.as_ref(), child.as_ref(), binding.into(), Some(transform))
    }

    fn insert_edge(
        &mut self,
        parent: &str,
        child: &str,
        binding: String,
        transform: Option<Transform>,
    ) -> Result<()> {
        let p = self.lookup(parent)?;
        let c = self.lookup(child)?;

        let taken = self
            .edges
            .iter()
            .flatten()
            .any(|e| e.child == c && e.binding == binding);
        if taken {
            return Err(OrchestrationError::DuplicateBinding {
                child: child.to_string(),
                binding,
            });
        }

        let cycle = || OrchestrationError::CycleDetected {
            parent: parent.to_string(),
            child: child.to_string(),
        };
        if p == c {
            return Err(cycle());
        }

        self.edges[p].push(Edge {
            child: c,
            binding,
            transform,
        });
        if self.kahn().is_none() {
            self.edges[p].pop();
            return Err(cycle());
        }
        log::debug!("Adding edge {parent} -> {child}");
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| OrchestrationError::DependencyUnresolved(name.to_string()))
    }

    pub(super) fn in_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.nodes.len()];
        for edge in self.edges.iter().flatten() {
            degrees[edge.child] += 1;
        }
        degrees
    }

    /// Kahn's algorithm with an insertion-ordered queue. `None` if some node can never
    /// be placed, i.e. the edges contain a cycle.
    pub(super) fn kahn(&self) -> Option<Vec<usize>> {
        let mut degrees = self.in_degrees();
        let mut queue: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| degrees[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = queue.pop_front() {
            order.push(i);
            for edge in &self.edges[i] {
                degrees[edge.child] -= 1;
                if degrees[edge.child] == 0 {
                    queue.push_back(edge.child);
                }
            }
        }
        (order.len() == self.nodes.len()).then_some(order)
    }

    /// Node keys in an order where every parent precedes its children.
    pub fn topological_order(&self) -> Vec<NodeKey> {
        self.kahn()
            .unwrap_or_default()
            .into_iter()
            .map(|i| NodeKey::new(self.nodes[i].name()))
            .collect()
    }

    /// Nodes without parents, in insertion order.
    pub fn sources(&self) -> Vec<NodeKey> {
        let degrees = self.in_degrees();
        (0..self.nodes.len())
            .filter(|&i| degrees[i] == 0)
            .map(|i| NodeKey::new(self.nodes[i].name()))
            .collect()
    }

    /// Nodes without children, in insertion order.
    pub fn sinks(&self) -> Vec<NodeKey> {
        (0..self.nodes.len())
            .filter(|&i| self.edges[i].is_empty())
            .map(|i| NodeKey::new(self.nodes[i].name()))
            .collect()
    }

    pub fn parents(&self, key: impl AsRef<str>) -> Vec<NodeKey> {
        let Some(&target) = self.index.get(key.as_ref()) else {
            return Vec::new();
        };
        (0..self.nodes.len())
            .filter(|&i| self.edges[i].iter().any(|e| e.child == target))
            .map(|i| NodeKey::new(self.nodes[i].name()))
            .collect()
    }

    pub fn children(&self, key: impl AsRef<str>) -> Vec<NodeKey> {
        let Some(&source) = self.index.get(key.as_ref()) else {
            return Vec::new();
        };
        self.edges[source]
            .iter()
            .map(|e| NodeKey::new(self.nodes[e.child].name()))
            .collect()
    }

    /// Start executing the graph. Results stream through the returned [`DagExecution`].
    ///
    /// Must be called inside a tokio runtime.
    pub fn execute(self) -> Result<DagExecution> {
        executor::spawn(self)
    }
}

impl fmt::Debug for DagProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagProject")
            .field("id", &self.id)
            .field("nodes", &self.nodes)
            .field("edges", &self.edges().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operator::Operator;

    fn operator() -> Operator {
        Operator::builder("Worker")
            .primitive("noop", |_| Ok(Message::text("")))
            .build()
            .unwrap()
    }

    fn graph(names: &[&str]) -> DagProject {
        let op = operator();
        let mut project = DagProject::new(CallOptions::new());
        for name in names {
            project.add_node(DagNode::new(*name, &op, "noop").unwrap()).unwrap();
        }
        project
    }

    #[test]
    fn test_unknown_capability_rejected() {
        let err = DagNode::new("a", &operator(), "fly").unwrap_err();
        assert!(matches!(err, OrchestrationError::UnknownCapability { .. }));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut project = graph(&["a"]);
        let err = project
            .add_node(DagNode::new("a", &operator(), "noop").unwrap())
            .unwrap_err();
        assert_eq!(err, OrchestrationError::DuplicateNode("a".into()));
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let mut project = graph(&["a", "b", "c"]);
        project.add_edge("a", "b", "x").unwrap();
        project.add_edge("b", "c", "x").unwrap();

        let err = project.add_edge("c", "a", "x").unwrap_err();
        assert_eq!(
            err,
            OrchestrationError::CycleDetected {
                parent: "c".into(),
                child: "a".into()
            }
        );
        assert_eq!(project.edges().count(), 2);
        assert!(project.children("c").is_empty());

        let err = project.add_edge("b", "b", "y").unwrap_err();
        assert!(matches!(err, OrchestrationError::CycleDetected { .. }));
    }

    #[test]
    fn test_edge_validation() {
        let mut project = graph(&["a", "b", "c"]);
        let err = project.add_edge("a", "ghost", "x").unwrap_err();
        assert_eq!(err, OrchestrationError::DependencyUnresolved("ghost".into()));

        project.add_edge("a", "c", "input").unwrap();
        let err = project.add_edge("b", "c", "input").unwrap_err();
        assert_eq!(
            err,
            OrchestrationError::DuplicateBinding {
                child: "c".into(),
                binding: "input".into()
            }
        );
    }

    #[test]
    fn test_graph_queries() {
        let mut project = graph(&["a", "b", "c", "d"]);
        project.add_edge("a", "c", "left").unwrap();
        project.add_edge("b", "c", "right").unwrap();
        project.add_edge("c", "d", "merged").unwrap();

        let keys = |v: Vec<NodeKey>| v.into_iter().map(|k| k.to_string()).collect::<Vec<_>>();
        assert_eq!(keys(project.sources()), vec!["a", "b"]);
        assert_eq!(keys(project.sinks()), vec!["d"]);
        assert_eq!(keys(project.parents("c")), vec!["a", "b"]);
        assert_eq!(keys(project.topological_order()), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_topological_order_respects_late_edges() {
        let mut project = graph(&["report", "fetch"]);
        project.add_edge("fetch", "report", "data").unwrap();
        let order: Vec<String> = project
            .topological_order()
            .into_iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(order, vec!["fetch", "report"]);
    }
}
