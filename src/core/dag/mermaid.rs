use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

use crate::core::dag::DagProject;

/// Layout direction of a mermaid flowchart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowchartDirection {
    LeftRight,
    RightLeft,
    #[default]
    TopDown,
    BottomUp,
}

impl fmt::Display for FlowchartDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowchartDirection::LeftRight => "LR",
            FlowchartDirection::RightLeft => "RL",
            FlowchartDirection::TopDown => "TD",
            FlowchartDirection::BottomUp => "BT",
        })
    }
}

/// Mermaid-safe node id. Distinct names always map to distinct ids:
/// `_` doubles and any other non-alphanumeric char becomes `_<hex>_`.
fn node_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            c if c.is_ascii_alphanumeric() || c == '-' => id.push(c),
            '_' => id.push_str("__"),
            c => {
                let _ = write!(id, "_{:x}_", u32::from(c));
            }
        }
    }
    id
}

impl DagProject {
    /// Render the graph as a mermaid flowchart, nodes in topological order.
    ///
    /// Each node shows as `Operator.task`; edges are labelled with their binding.
    pub fn draw_mermaid(&self, title: Option<&str>, direction: FlowchartDirection) -> String {
        let mut out = String::new();
        if let Some(title) = title {
            let _ = write!(out, "---\ntitle: {title}\n---\n");
        }
        let _ = writeln!(out, "flowchart {direction}");

        for i in self.kahn().unwrap_or_default() {
            let node = &self.nodes[i];
            let id = node_id(node.name());
            let _ = writeln!(out, "\t{id}([\"{}\"])", node.label());
            for edge in &self.edges[i] {
                let child = node_id(self.nodes[edge.child].name());
                let _ = writeln!(out, "\t{id} -->|{}| {child}", edge.binding);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dag::DagNode;
    use crate::core::message::Message;
    use crate::core::operator::{CallOptions, Operator};

    #[test]
    fn test_draw_mermaid() {
        let op = Operator::builder("Researcher")
            .primitive("search", |_| Ok(Message::text("")))
            .build()
            .unwrap();
        let mut project = DagProject::new(CallOptions::new());
        let summary = project
            .add_node(DagNode::new("write summary", &op, "search").unwrap())
            .unwrap();
        let fetch = project.add_node(DagNode::new("fetch", &op, "search").unwrap()).unwrap();
        project.add_edge(&fetch, &summary, "sources").unwrap();

        let chart = project.draw_mermaid(Some("Research"), FlowchartDirection::LeftRight);
        assert_eq!(
            chart,
            "---\ntitle: Research\n---\nflowchart LR\n\
             \tfetch([\"Researcher.search\"])\n\
             \tfetch -->|sources| write_20_summary\n\
             \twrite_20_summary([\"Researcher.search\"])\n"
        );

        let plain = project.draw_mermaid(None, FlowchartDirection::default());
        assert!(plain.starts_with("flowchart TD\n"));
    }

    #[test]
    fn test_node_ids_stay_distinct() {
        assert_eq!(node_id("fetch-2"), "fetch-2");
        assert_ne!(node_id("a b"), node_id("ab"));
        assert_ne!(node_id("a b"), node_id("a_b"));
        assert_ne!(node_id("a_20_b"), node_id("a b"));
    }
}
