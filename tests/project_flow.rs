//! End-to-end test of the linear software project through the orchestrator.

use ensemble::prelude::*;
use ensemble::{CompletionRequest, LLMError, ProjectPhase, ProjectStatus};
use serde_json::{Value, json};
use std::sync::Arc;

/// Answers by response format, the way a well-behaved model would.
fn route(request: &CompletionRequest) -> Result<Value, LLMError> {
    let prompt = request.last_user().unwrap_or_default();
    Ok(match request.response_format.name.as_str() {
        "PlannedComponents" => json!({
            "components": ["Create greet() in greet.py", "Call greet() from main.py"]
        }),
        "ProjectFile" if prompt.contains("Current Component: Create greet()") => json!({
            "file_name": "greet.py",
            "file_contents": "def greet():\n    print('hello')"
        }),
        "ProjectFile" => json!({
            "file_name": "main.py",
            "file_contents": "from greet import greet\ngreet()"
        }),
        "Summary" => json!({
            "summary": ["1. Created greet() in greet.py", "2. Called greet() in main.py"]
        }),
        "ProjectDirectory" => json!({
            "project_name": "hello",
            "files": [
                { "file_name": "greet.py", "file_contents": "def greet():\n    print('hello')" },
                { "file_name": "main.py", "file_contents": "from greet import greet\ngreet()" }
            ]
        }),
        _ if prompt.contains("No Question") => json!("No Question"),
        _ => json!("Okay"),
    })
}

#[tokio::test]
async fn test_project_streams_every_step() {
    let client = Arc::new(ScriptedClient::from_fn("router", route));
    let orchestrator = Orchestrator::new()
        .with_project_config(ProjectConfig::default().with_clarification_rounds(1))
        .with_default_roles("router", client.clone())
        .unwrap();

    let mut run = orchestrator
        .process_new_project("Print hello from a helper module", &ProjectRoles::default())
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = run.next().await {
        events.push(event.unwrap());
    }

    let roles: Vec<&str> = events.iter().map(|e| e.role.as_str()).collect();
    assert_eq!(
        roles,
        vec![
            "Executive", // plan
            "Developer", // question, component 0
            "Developer", // implement
            "Executive", // summary
            "Developer", // question, component 1
            "Developer", // implement
            "Executive", // summary
            "Developer", // integrate
        ]
    );
    assert_eq!(events[2].phase, ProjectPhase::Executing(0));
    assert_eq!(events[5].message.get("file_name"), Some(&json!("main.py")));

    let directory = &events.last().unwrap().message;
    assert_eq!(directory.kind, "ProjectDirectory");
    assert_eq!(directory.get("files").and_then(Value::as_array).map(Vec::len), Some(2));

    let integrate = client.requests().last().unwrap().last_user().unwrap().to_string();
    assert!(integrate.contains("File: greet.py"));
    assert!(integrate.contains("Idea: Print hello from a helper module"));

    assert_eq!(run.status(), ProjectStatus::Finished);
}

#[tokio::test]
async fn test_custom_roles() {
    let client = Arc::new(ScriptedClient::from_fn("router", route));
    let mut orchestrator = Orchestrator::new();
    orchestrator.add_client("router", client);
    let lead = roles::executive(orchestrator.operator_builder("Lead")).build().unwrap();
    let coder = roles::developer(orchestrator.operator_builder("Coder")).build().unwrap();
    orchestrator.add_operator(lead, "lead");
    orchestrator.add_operator(coder, "coder");

    let events = orchestrator
        .process_new_project("hello", &ProjectRoles::new("lead", "coder"))
        .unwrap()
        .collect_events()
        .await
        .unwrap();
    assert_eq!(events.first().unwrap().role, "Lead");
    assert_eq!(events.last().unwrap().role, "Coder");

    let err = orchestrator
        .process_new_project("hello", &ProjectRoles::new("lead", "intern"))
        .unwrap_err();
    assert_eq!(err, OrchestrationError::UnknownOperator("intern".into()));
}
