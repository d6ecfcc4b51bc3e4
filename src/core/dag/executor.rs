use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{FuturesUnordered, Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::arguments::Arguments;
use crate::core::dag::{DagProject, NodeKey, NodeStatus};
use crate::core::error::{OrchestrationError, Result};
use crate::core::message::Message;

// ============================================================================
// Events
// ============================================================================

/// How a node ended.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Completed(Message),
    Failed(OrchestrationError),
    /// Never ran because `cause` (an ancestor) failed.
    Skipped { cause: NodeKey },
}

/// Emitted once per node as soon as it reaches a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEvent {
    pub node: NodeKey,
    pub operator: String,
    pub operator_id: Uuid,
    pub outcome: NodeOutcome,
}

impl NodeEvent {
    pub fn status(&self) -> NodeStatus {
        match self.outcome {
            NodeOutcome::Completed(_) => NodeStatus::Completed,
            NodeOutcome::Failed(_) => NodeStatus::Failed,
            NodeOutcome::Skipped { .. } => NodeStatus::Skipped,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match &self.outcome {
            NodeOutcome::Completed(message) => Some(message),
            _ => None,
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Final state of every node after a run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    statuses: Vec<(NodeKey, NodeStatus)>,
    results: HashMap<NodeKey, Message>,
    errors: HashMap<NodeKey, OrchestrationError>,
}

impl ExecutionReport {
    /// Statuses in node insertion order.
    pub fn statuses(&self) -> impl Iterator<Item = (&NodeKey, NodeStatus)> {
        self.statuses.iter().map(|(key, status)| (key, *status))
    }

    pub fn status(&self, node: &str) -> Option<NodeStatus> {
        self.statuses
            .iter()
            .find(|(key, _)| key.as_str() == node)
            .map(|(_, status)| *status)
    }

    pub fn result(&self, node: &str) -> Option<&Message> {
        self.results.get(node)
    }

    pub fn error(&self, node: &str) -> Option<&OrchestrationError> {
        self.errors.get(node)
    }

    pub fn completed(&self) -> Vec<NodeKey> {
        self.with_status(NodeStatus::Completed)
    }

    pub fn failed(&self) -> Vec<NodeKey> {
        self.with_status(NodeStatus::Failed)
    }

    pub fn skipped(&self) -> Vec<NodeKey> {
        self.with_status(NodeStatus::Skipped)
    }

    /// True when every node completed.
    pub fn is_success(&self) -> bool {
        self.statuses
            .iter()
            .all(|(_, status)| *status == NodeStatus::Completed)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn into_results(self) -> HashMap<NodeKey, Message> {
        self.results
    }

    fn with_status(&self, wanted: NodeStatus) -> Vec<NodeKey> {
        self.statuses
            .iter()
            .filter(|(_, status)| *status == wanted)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

// ============================================================================
// Execution handle
// ============================================================================

/// A running graph. Yields a [`NodeEvent`] per node as it finishes.
///
/// Dropping the handle early is allowed: nodes already in flight finish, nothing new
/// is scheduled.
pub struct DagExecution {
    receiver: mpsc::Receiver<NodeEvent>,
    handle: JoinHandle<ExecutionReport>,
}

impl DagExecution {
    pub async fn next_event(&mut self) -> Option<NodeEvent> {
        self.receiver.recv().await
    }

    /// Drain the remaining events and wait for the run to end.
    ///
    /// Fails with `GraphFailed` when the graph has nodes but none of them completed.
    pub async fn finish(mut self) -> Result<ExecutionReport> {
        while self.receiver.recv().await.is_some() {}
        let report = self
            .handle
            .await
            .map_err(|e| OrchestrationError::ExecutorStopped(e.to_string()))?;

        if !report.is_empty() && report.completed().is_empty() {
            let failed = report.failed().into_iter().map(|k| k.to_string()).collect();
            return Err(OrchestrationError::GraphFailed { failed });
        }
        Ok(report)
    }
}

impl Stream for DagExecution {
    type Item = NodeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<NodeEvent>> {
        self.receiver.poll_recv(cx)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub(super) fn spawn(project: DagProject) -> Result<DagExecution> {
    let runtime =
        Handle::try_current().map_err(|e| OrchestrationError::ExecutorStopped(e.to_string()))?;
    let (sender, receiver) = mpsc::channel(project.config.channel_capacity.max(1));
    let handle = runtime.spawn(drive(project, sender));
    Ok(DagExecution { receiver, handle })
}

async fn drive(project: DagProject, events: mpsc::Sender<NodeEvent>) -> ExecutionReport {
    let count = project.nodes.len();
    let order = project.kahn().unwrap_or_default();
    let mut degrees = project.in_degrees();
    let mut statuses = vec![NodeStatus::Pending; count];
    let mut bindings = vec![Arguments::new(); count];
    let mut results: HashMap<NodeKey, Message> = HashMap::new();
    let mut errors: HashMap<NodeKey, OrchestrationError> = HashMap::new();
    let mut ready: VecDeque<usize> = (0..count).filter(|&i| degrees[i] == 0).collect();
    let mut running = FuturesUnordered::new();
    let mut consumer_gone = false;
    let limit = project.config.max_concurrency.max(1);

    log::info!(
        "Executing graph {} ({} nodes, concurrency {})",
        project.id(),
        count,
        limit
    );

    loop {
        while !consumer_gone && running.len() < limit {
            let Some(i) = ready.pop_front() else { break };
            statuses[i] = NodeStatus::Running;
            let node = &project.nodes[i];
            let args = std::mem::take(&mut bindings[i]);
            let options = &project.options;
            log::debug!("Starting node '{}' ({})", node.name(), node.label());
            running.push(async move { (i, node.execute(args, options).await) });
        }

        let Some((i, outcome)) = running.next().await else {
            break;
        };
        let node = &project.nodes[i];
        let key = NodeKey::new(node.name());
        let mut emitted = Vec::new();

        match outcome {
            Ok(message) => {
                log::debug!("Node '{key}' completed");
                statuses[i] = NodeStatus::Completed;
                for edge in &project.edges[i] {
                    bindings[edge.child].insert(edge.binding.clone(), edge.apply(&message));
                    degrees[edge.child] -= 1;
                    if degrees[edge.child] == 0 && statuses[edge.child] == NodeStatus::Pending {
                        ready.push_back(edge.child);
                    }
                }
                results.insert(key.clone(), message.clone());
                emitted.push((i, NodeOutcome::Completed(message)));
            }
            Err(err) => {
                log::warn!("Node '{key}' failed: {err}");
                statuses[i] = NodeStatus::Failed;
                errors.insert(key.clone(), err.clone());
                emitted.push((i, NodeOutcome::Failed(err)));

                let doomed = descendants(&project, i);
                for &j in &order {
                    if doomed[j] && statuses[j] == NodeStatus::Pending {
                        statuses[j] = NodeStatus::Skipped;
                        bindings[j] = Arguments::new();
                        emitted.push((j, NodeOutcome::Skipped { cause: key.clone() }));
                    }
                }
            }
        }

        for (j, outcome) in emitted {
            if consumer_gone {
                break;
            }
            let node = &project.nodes[j];
            let event = NodeEvent {
                node: NodeKey::new(node.name()),
                operator: node.operator().name().to_string(),
                operator_id: node.operator().id(),
                outcome,
            };
            if events.send(event).await.is_err() {
                log::warn!(
                    "Event receiver for graph {} dropped; draining {} in-flight node(s)",
                    project.id(),
                    running.len()
                );
                consumer_gone = true;
            }
        }
    }

    let report = ExecutionReport {
        statuses: project
            .nodes
            .iter()
            .zip(statuses)
            .map(|(node, status)| (NodeKey::new(node.name()), status))
            .collect(),
        results,
        errors,
    };
    log::info!(
        "Graph {} finished: {} completed, {} failed, {} skipped",
        project.id(),
        report.completed().len(),
        report.failed().len(),
        report.skipped().len()
    );
    report
}

fn descendants(project: &DagProject, root: usize) -> Vec<bool> {
    let mut seen = vec![false; project.nodes.len()];
    let mut stack = vec![root];
    while let Some(i) = stack.pop() {
        for edge in &project.edges[i] {
            if !seen[edge.child] {
                seen[edge.child] = true;
                stack.push(edge.child);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dag::{DagNode, ExecutorConfig};
    use crate::core::operator::{CallOptions, Operator};
    use serde_json::{Value, json};

    fn worker() -> Operator {
        Operator::builder("Worker")
            .primitive("echo", |args| Ok(Message::text(args.text("message")?)))
            .primitive("join", |args| {
                Ok(Message::text(format!(
                    "{} + {}",
                    args.text("left")?,
                    args.text("right")?
                )))
            })
            .primitive("fail", |_| {
                Err(OrchestrationError::Delegation("boom".to_string()))
            })
            .build()
            .unwrap()
    }

    fn add(project: &mut DagProject, op: &Operator, name: &str, task: &str) -> NodeKey {
        project.add_node(DagNode::new(name, op, task).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_fan_in_binds_parent_results() {
        let op = worker();
        let mut project = DagProject::new(CallOptions::new());
        let left = project
            .add_node(DagNode::new("left", &op, "echo").unwrap().with_arg("message", "L"))
            .unwrap();
        let right = project
            .add_node(DagNode::new("right", &op, "echo").unwrap().with_arg("message", "R"))
            .unwrap();
        let merge = add(&mut project, &op, "merge", "join");
        project.add_edge(&left, &merge, "left").unwrap();
        project.add_edge(&right, &merge, "right").unwrap();

        let mut run = project.execute().unwrap();
        let mut seen = Vec::new();
        while let Some(event) = run.next().await {
            seen.push(event.node.to_string());
        }
        assert_eq!(seen.last().map(String::as_str), Some("merge"));

        let report = run.finish().await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.result("merge").unwrap().as_text(), Some("L + R"));
    }

    #[tokio::test]
    async fn test_failure_skips_descendants_only() {
        let op = worker();
        let mut project = DagProject::new(CallOptions::new());
        let a = add(&mut project, &op, "a", "fail");
        let b = add(&mut project, &op, "b", "echo");
        let c = add(&mut project, &op, "c", "echo");
        project
            .add_node(DagNode::new("d", &op, "echo").unwrap().with_arg("message", "ok"))
            .unwrap();
        project.add_edge(&a, &b, "message").unwrap();
        project.add_edge(&b, &c, "message").unwrap();

        let mut run = project.execute().unwrap();
        let mut events = Vec::new();
        while let Some(event) = run.next_event().await {
            events.push(event);
        }
        let skipped: Vec<_> = events
            .iter()
            .filter(|e| e.status() == NodeStatus::Skipped)
            .map(|e| (e.node.to_string(), e.outcome.clone()))
            .collect();
        assert_eq!(
            skipped,
            vec![
                ("b".to_string(), NodeOutcome::Skipped { cause: "a".into() }),
                ("c".to_string(), NodeOutcome::Skipped { cause: "a".into() }),
            ]
        );

        let report = run.finish().await.unwrap();
        assert_eq!(report.status("a"), Some(NodeStatus::Failed));
        assert_eq!(report.status("d"), Some(NodeStatus::Completed));
        assert_eq!(report.skipped(), vec![NodeKey::from("b"), NodeKey::from("c")]);
        assert_eq!(
            report.error("a"),
            Some(&OrchestrationError::Delegation("boom".to_string()))
        );
    }

    #[tokio::test]
    async fn test_all_failed_is_graph_failure() {
        let op = worker();
        let mut project = DagProject::new(CallOptions::new());
        let a = add(&mut project, &op, "a", "fail");
        let b = add(&mut project, &op, "b", "echo");
        project.add_edge(&a, &b, "message").unwrap();

        let err = project.execute().unwrap().finish().await.unwrap_err();
        assert_eq!(
            err,
            OrchestrationError::GraphFailed {
                failed: vec!["a".to_string()]
            }
        );
        assert_eq!(err.to_string(), "No node completed; failed nodes: [\"a\"]");
    }

    #[tokio::test]
    async fn test_empty_graph_finishes() {
        let report = DagProject::new(CallOptions::new())
            .execute()
            .unwrap()
            .finish()
            .await
            .unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_transform_edge_and_arg_precedence() {
        let op = worker();
        let mut project = DagProject::new(CallOptions::new());
        let source = project
            .add_node(DagNode::new("source", &op, "echo").unwrap().with_arg("message", "shout"))
            .unwrap();
        let sink = project
            .add_node(
                DagNode::new("sink", &op, "echo")
                    .unwrap()
                    .with_arg("message", "default"),
            )
            .unwrap();
        project
            .add_edge_with(&source, &sink, "message", |m: &Message| {
                Value::String(m.as_text().unwrap_or_default().to_uppercase())
            })
            .unwrap();

        let report = project.execute().unwrap().finish().await.unwrap();
        assert_eq!(report.result("sink").unwrap().as_text(), Some("SHOUT"));
    }

    #[tokio::test]
    async fn test_sequential_with_single_slot() {
        let op = worker();
        let mut project =
            DagProject::new(CallOptions::new()).with_config(ExecutorConfig::default().with_max_concurrency(1));
        for name in ["one", "two", "three"] {
            project
                .add_node(DagNode::new(name, &op, "echo").unwrap().with_arg("message", json!(name)))
                .unwrap();
        }

        let run = project.execute().unwrap();
        let order: Vec<String> = run.map(|e| e.node.to_string()).collect().await;
        assert_eq!(order, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_zero_limits_are_clamped() {
        let op = worker();
        let config = ExecutorConfig {
            max_concurrency: 0,
            channel_capacity: 0,
        };
        let mut project = DagProject::new(CallOptions::new()).with_config(config);
        let a = project
            .add_node(DagNode::new("a", &op, "echo").unwrap().with_arg("message", "x"))
            .unwrap();
        let b = add(&mut project, &op, "b", "echo");
        project.add_edge(&a, &b, "message").unwrap();

        let report = project.execute().unwrap().finish().await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.result("b").unwrap().as_text(), Some("x"));
    }

    #[tokio::test]
    async fn test_dropped_receiver_still_drains() {
        let op = worker();
        let mut project = DagProject::new(CallOptions::new());
        let a = project
            .add_node(DagNode::new("a", &op, "echo").unwrap().with_arg("message", "x"))
            .unwrap();
        let b = add(&mut project, &op, "b", "echo");
        project.add_edge(&a, &b, "message").unwrap();

        let DagExecution { receiver, handle } = project.execute().unwrap();
        drop(receiver);
        let report = handle.await.unwrap();
        assert_eq!(report.status("a"), Some(NodeStatus::Completed));
        assert_eq!(report.status("b"), Some(NodeStatus::Pending));
    }
}
