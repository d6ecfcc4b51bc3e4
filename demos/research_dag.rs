//! A research graph: two independent lookups fan into a comparison, which feeds a report.
//!
//! This example demonstrates:
//! - Building a DagProject from operator capabilities
//! - Forwarding results along edges, with and without a transform
//! - Giving one operator a tool it can call mid-completion
//! - Consuming node events as they land, then reading the final report
//! - Rendering the graph as a mermaid flowchart

use ensemble::prelude::*;
use ensemble::{Arithmetic, CompletionRequest, FlowchartDirection, LLMError};
use serde_json::{Value, json};
use std::sync::Arc;

// ============================================================================
// Step 1: A model stand-in
// ============================================================================

fn scripted_model(request: &CompletionRequest) -> Result<Value, LLMError> {
    let prompt = request.last_user().unwrap_or_default();
    let payload = if prompt.contains("The tool returned") {
        json!({ "text": "Rust (2015) and Go (2012) differ by 3 years." })
    } else if request.response_format.has_tool_fields() {
        json!({
            "text": "",
            "tool_name": "Arithmetic",
            "tool_method": "subtract",
            "tool_parameters": [{ "name": "x", "value": 2015 }, { "name": "y", "value": 2012 }]
        })
    } else if prompt.contains("Rust") && prompt.contains("Go") {
        json!("Both languages compile to native code; Rust is younger.")
    } else if prompt.contains("Rust") {
        json!("Rust 1.0 was released in 2015.")
    } else {
        json!("Go 1.0 was released in 2012.")
    };
    Ok(payload)
}

// ============================================================================
// Step 2: Operators
// ============================================================================

fn researcher(client: Arc<ScriptedClient>, registry: Arc<ToolRegistry>) -> ensemble::Result<Operator> {
    roles::generic(Operator::builder("Researcher"))
        .client("scripted", client)
        .registry(registry)
        .tool(Arithmetic::NAME)
        .prompt("lookup", |args| {
            Ok(format!("When was {} 1.0 released?", args.text("language")?))
        })
        .prompt("compare", |args| {
            Ok(format!(
                "Compare these findings:\n- {}\n- {}",
                args.text("left")?,
                args.text("right")?
            ))
        })
        .build()
}

fn editor(client: Arc<ScriptedClient>, registry: Arc<ToolRegistry>) -> ensemble::Result<Operator> {
    Operator::builder("Editor")
        .instructions("You write short reports.")
        .client("scripted", client)
        .registry(registry)
        .tool(Arithmetic::NAME)
        .use_tools(true)
        .prompt("report", |args| {
            Ok(format!("How many years apart are these releases? {}", args.text("findings")?))
        })
        .build()
}

// ============================================================================
// Step 3: Build, draw and run the graph
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> ensemble::Result<()> {
    env_logger::init();

    let client = Arc::new(ScriptedClient::from_fn("scripted-model", scripted_model));
    let registry = Arc::new(ToolRegistry::with_tools([Arithmetic::tool()?])?);
    let researcher = researcher(client.clone(), registry.clone())?;
    let editor = editor(client.clone(), registry)?;

    let mut project = DagProject::new(CallOptions::new())
        .with_config(ExecutorConfig::default().with_max_concurrency(2));
    let rust = project
        .add_node(DagNode::new("rust", &researcher, "lookup")?.with_arg("language", "Rust"))?;
    let go = project
        .add_node(DagNode::new("go", &researcher, "lookup")?.with_arg("language", "Go"))?;
    let compare = project.add_node(DagNode::new("compare", &researcher, "compare")?)?;
    let report = project.add_node(DagNode::new("report", &editor, "report")?)?;

    project.add_edge(&rust, &compare, "left")?;
    project.add_edge(&go, &compare, "right")?;
    project.add_edge_with(&rust, &report, "findings", |message: &Message| {
        Value::String(format!("Findings: {message}"))
    })?;

    let chart = project.draw_mermaid(Some("Release research"), FlowchartDirection::LeftRight);
    println!("{chart}");

    let mut run = project.execute()?;
    while let Some(event) = run.next().await {
        let who = format!("[{}] {}", event.operator, event.node);
        match &event.outcome {
            NodeOutcome::Completed(message) => println!("{who} -> {message}"),
            NodeOutcome::Failed(err) => println!("{who} failed: {err}"),
            NodeOutcome::Skipped { cause } => println!("{who} skipped ({cause} failed)"),
        }
    }

    let summary = run.finish().await?;
    println!("\nCompleted: {:?}", summary.completed());
    println!("Model calls: {}", client.request_count());
    Ok(())
}
