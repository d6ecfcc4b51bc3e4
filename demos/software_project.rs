//! A linear software project driven end to end by an offline scripted model.
//!
//! This example demonstrates:
//! - Registering the default executive and developer roles on an Orchestrator
//! - Streaming every planning, implementation and integration step as it happens
//! - Watching the project status while the run streams
//!
//! Run with `RUST_LOG=debug cargo run --example software_project` to see the
//! pipeline phases.

use ensemble::prelude::*;
use ensemble::{CompletionRequest, LLMError, ProjectConfig};
use serde_json::{Value, json};
use std::sync::Arc;

// ============================================================================
// Step 1: A model stand-in
// ============================================================================

/// Answers by the requested response format, like a cooperative model would.
fn scripted_model(request: &CompletionRequest) -> Result<Value, LLMError> {
    let prompt = request.last_user().unwrap_or_default();
    let payload = match request.response_format.name.as_str() {
        "PlannedComponents" => json!({
            "components": [
                "Create a function 'greet' in 'greet.rs' that returns a greeting",
                "Print the greeting from 'main.rs'"
            ]
        }),
        "ProjectFile" if prompt.contains("Current Component: Create") => json!({
            "file_name": "src/greet.rs",
            "file_contents": "pub fn greet() -> &'static str {\n    \"Hello, world!\"\n}\n"
        }),
        "ProjectFile" => json!({
            "file_name": "src/main.rs",
            "file_contents": "mod greet;\n\nfn main() {\n    println!(\"{}\", greet::greet());\n}\n"
        }),
        "Summary" => json!({
            "summary": [
                "1. Created 'greet' returning a greeting in 'src/greet.rs'",
                "2. Printed greet() from 'src/main.rs'"
            ]
        }),
        "ProjectDirectory" => json!({
            "project_name": "hello",
            "files": [
                {
                    "file_name": "src/greet.rs",
                    "file_contents": "pub fn greet() -> &'static str {\n    \"Hello, world!\"\n}\n"
                },
                {
                    "file_name": "src/main.rs",
                    "file_contents": "mod greet;\n\nfn main() {\n    println!(\"{}\", greet::greet());\n}\n"
                }
            ]
        }),
        _ if prompt.contains("Developer's Question") => json!("Name the module 'greet'."),
        _ if prompt.contains("src/greet.rs") => json!("No Question"),
        _ => json!("What should the module be called?"),
    };
    Ok(payload)
}

// ============================================================================
// Step 2: Wire and run
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> ensemble::Result<()> {
    env_logger::init();

    let model = Arc::new(ScriptedClient::from_fn("scripted-model", scripted_model));
    let orchestrator = Orchestrator::new()
        .with_project_config(ProjectConfig::default().with_clarification_rounds(2))
        .with_default_roles("scripted", model.clone())?;

    println!("=== Software project ===\n");
    let mut run = orchestrator.process_new_project(
        "Write a Rust program that prints a greeting from a helper module",
        &ProjectRoles::default(),
    )?;
    let status = run.watch_status();

    while let Some(event) = run.next().await {
        let event = event?;
        println!("[{} / {:?}] {}", event.role, event.phase, event.capability);
        println!("{}\n", event.message);
    }

    println!("Project status: {:?}", *status.borrow());
    println!("Model calls: {}", model.request_count());
    Ok(())
}
