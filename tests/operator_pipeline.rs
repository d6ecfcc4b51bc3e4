//! Integration tests for operator calls: tools, storage, delegation and call options.

use async_trait::async_trait;
use ensemble::prelude::*;
use ensemble::{
    Arithmetic, CallOutcome, CompletionRequest, LLMError, LocalTaskQueue, MemoryMessageStore,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Sleeps before answering with a fixed text.
struct SlowClient {
    delay: Duration,
}

#[async_trait]
impl LanguageModelClient for SlowClient {
    fn model_name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Value, LLMError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!("done"))
    }
}

fn assistant(client: Arc<dyn LanguageModelClient>) -> ensemble::OperatorBuilder {
    roles::generic(Operator::builder("Assistant")).client("main", client)
}

fn chat(message: &str) -> Arguments {
    Arguments::new().with("message", message)
}

#[tokio::test]
async fn test_tool_call_then_answer() {
    let registry = Arc::new(ToolRegistry::with_tools([Arithmetic::tool().unwrap()]).unwrap());
    let client = Arc::new(
        ScriptedClient::new("scripted")
            .respond(json!({
                "text": "",
                "tool_name": "Arithmetic",
                "tool_method": "Arithmetic.add()",
                "tool_parameters": [{ "name": "x", "value": 945 }, { "name": "y", "value": 624 }]
            }))
            .respond(json!({ "text": "The sum is 1569" })),
    );
    let op = assistant(client.clone())
        .registry(registry)
        .tool(Arithmetic::NAME)
        .use_tools(true)
        .build()
        .unwrap();

    let reply = op.invoke("chat", chat("What is 945 + 624?"), CallOptions::new()).await.unwrap();
    assert_eq!(reply.as_text(), Some("The sum is 1569"));
    assert!(reply.get("tool_name").is_none());

    let feedback = client.requests()[1].last_user().unwrap().to_string();
    assert!(feedback.contains("The tool returned: 1569"));
    assert!(feedback.ends_with("What is 945 + 624?"));
}

#[tokio::test]
async fn test_messages_are_stored() {
    let store = Arc::new(MemoryMessageStore::new());
    let client = Arc::new(ScriptedClient::new("scripted").respond("hi").respond("again"));
    let op = assistant(client).store(store.clone()).build().unwrap();

    op.invoke("chat", chat("hello"), CallOptions::new()).await.unwrap();
    op.invoke("chat", chat("hello"), CallOptions::new()).await.unwrap();

    let records = store.by_operator(op.id()).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].capability, "chat");
    assert_eq!(records[1].message.as_text(), Some("again"));
}

#[tokio::test]
async fn test_delegated_call_resolves() {
    let client: Arc<dyn LanguageModelClient> = Arc::new(SlowClient {
        delay: Duration::from_millis(5),
    });
    let op = assistant(client)
        .queue(Arc::new(LocalTaskQueue::new(2)))
        .run_async(true)
        .build()
        .unwrap();

    let outcome = op.call("chat", chat("work"), CallOptions::new()).await.unwrap();
    assert!(outcome.is_deferred());
    let message = op.resolve(outcome).await.unwrap();
    assert_eq!(message.as_text(), Some("done"));

    let inline = op
        .call("chat", chat("work"), CallOptions::new().with_run_async(false))
        .await
        .unwrap();
    assert!(matches!(inline, CallOutcome::Ready(_)));
}

#[tokio::test]
async fn test_delegation_timeout_surfaces() {
    let client: Arc<dyn LanguageModelClient> = Arc::new(SlowClient {
        delay: Duration::from_millis(500),
    });
    let op = assistant(client)
        .queue(Arc::new(LocalTaskQueue::default()))
        .run_async(true)
        .config(OperatorConfig::default().with_delegation_timeout(Duration::from_millis(20)))
        .build()
        .unwrap();

    let err = op.invoke("chat", chat("work"), CallOptions::new()).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::DelegationTimeout { .. }));
}

#[tokio::test]
async fn test_options_from_json() {
    let client = Arc::new(
        ScriptedClient::new("scripted")
            .respond(json!({ "summary": ["one", "two"], "unexpected": true })),
    );
    let op = assistant(client.clone()).build().unwrap();

    let options = CallOptions::from_value(&json!({
        "response_format": "Summary",
        "instructions": "Summarize tersely.",
        "priority": "ignored"
    }))
    .unwrap();
    let message = op.invoke("chat", chat("summarize"), options).await.unwrap();

    assert_eq!(message.kind, "Summary");
    assert_eq!(message.get("summary"), Some(&json!(["one", "two"])));
    assert_eq!(client.requests()[0].system(), Some("Summarize tersely."));
}

#[tokio::test]
async fn test_schema_failure_after_retries() {
    let client = Arc::new(
        ScriptedClient::new("scripted")
            .respond("not json")
            .respond("still not json")
            .respond("nope"),
    );
    let op = assistant(client.clone()).build().unwrap();

    let err = op
        .invoke(
            "chat",
            chat("plan"),
            CallOptions::new().with_response_format(formats::planned_components()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::SchemaValidation { .. }));
    assert_eq!(client.request_count(), 3);
}
