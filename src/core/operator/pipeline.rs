use std::sync::Arc;

use serde_json::Value;

use crate::core::arguments::render_text;
use crate::core::error::{OrchestrationError, Result};
use crate::core::message::{Message, MessageFormat, ToolCall};
use crate::core::operator::{CallOptions, OperatorCore};
use crate::core::store::StoredMessage;
use crate::llm::{ChatMessage, CompletionRequest, LLMError, LanguageModelClient};

const TOOLS_ADDENDUM: &str = "Here are your available tools. If invoking a tool will help you answer the question, fill in the exact values for tool_name, tool_method, and tool_parameters. Leave these fields empty if no tool is needed.";

/// Where a single capability call currently is. Transitions are logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Building,
    AwaitingModel,
    Validating,
    ToolDispatch,
    Done,
    Failed,
}

struct Call<'a> {
    core: &'a OperatorCore,
    capability: &'a str,
    client: Arc<dyn LanguageModelClient>,
    base_format: MessageFormat,
    format: MessageFormat,
    tools: Vec<String>,
}

impl Call<'_> {
    fn phase(&self, phase: CallPhase) {
        log::debug!("{}.{}: {:?}", self.core.name, self.capability, phase);
    }
}

/// Runs one prompt capability through the completion pipeline.
pub(crate) async fn run(
    core: &OperatorCore,
    capability: &str,
    query: String,
    options: &CallOptions,
) -> Result<Message> {
    let result = complete(core, capability, query, options).await;
    match &result {
        Ok(_) => log::debug!("{}.{}: {:?}", core.name, capability, CallPhase::Done),
        Err(e) => log::debug!("{}.{}: {:?} ({e})", core.name, capability, CallPhase::Failed),
    }
    result
}

async fn complete(
    core: &OperatorCore,
    capability: &str,
    query: String,
    options: &CallOptions,
) -> Result<Message> {
    let call = prepare(core, capability, options)?;
    call.phase(CallPhase::Building);

    let instructions = options.instructions.as_deref().unwrap_or(&core.instructions);
    let mut prompt = query.clone();
    if !call.tools.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(TOOLS_ADDENDUM);
        prompt.push_str("\n\n");
        prompt.push_str(&core.registry.describe_all(&call.tools)?);
    }
    let mut conversation = vec![ChatMessage::system(instructions), ChatMessage::user(prompt)];

    let mut schema_retries = 0;
    let mut tool_calls = 0;
    loop {
        call.phase(CallPhase::AwaitingModel);
        let request = CompletionRequest {
            messages: conversation.clone(),
            response_format: call.format.clone(),
        };
        let payload = call.client.complete(request).await?;

        call.phase(CallPhase::Validating);
        let message = match call.format.parse(payload.clone()) {
            Ok(message) => message,
            Err(OrchestrationError::SchemaValidation { format, reason })
                if schema_retries < core.config.max_schema_retries =>
            {
                schema_retries += 1;
                log::warn!(
                    "{}.{}: response did not match '{format}' ({reason}), re-prompting ({schema_retries}/{})",
                    core.name,
                    capability,
                    core.config.max_schema_retries
                );
                conversation.push(ChatMessage::assistant(payload_text(&payload)));
                conversation.push(ChatMessage::user(format!(
                    "Your response did not match the required format '{format}': {reason}\nRespond again with a valid {format}."
                )));
                continue;
            }
            Err(e) => return Err(e),
        };

        let Some(tool_call) = message.tool_call() else {
            let message = if call.tools.is_empty() {
                message
            } else {
                message.into_terminal(&call.base_format.name)
            };
            save(core, capability, &message).await;
            return Ok(message);
        };

        if tool_calls >= core.config.max_tool_iterations {
            return Err(OrchestrationError::ToolLoopExceeded {
                limit: core.config.max_tool_iterations,
            });
        }
        tool_calls += 1;
        call.phase(CallPhase::ToolDispatch);

        let feedback = dispatch(&call, &tool_call, &query).await;
        conversation.push(ChatMessage::assistant(payload_text(&payload)));
        conversation.push(ChatMessage::user(feedback));
    }
}

fn prepare<'a>(
    core: &'a OperatorCore,
    capability: &'a str,
    options: &CallOptions,
) -> Result<Call<'a>> {
    let client_name = options
        .client
        .as_deref()
        .or(core.default_client.as_deref())
        .ok_or_else(|| {
            OrchestrationError::Llm(LLMError::ProviderNotConfigured(format!(
                "operator '{}' has no client",
                core.name
            )))
        })?;
    let client = core
        .clients
        .get(client_name)
        .cloned()
        .ok_or_else(|| OrchestrationError::UnknownClient(client_name.to_string()))?;

    let tools = match &options.tools {
        Some(tools) => tools.clone(),
        None if options.use_tools.unwrap_or(core.use_tools) => core.tools.clone(),
        None => Vec::new(),
    };

    let base_format = options
        .response_format
        .clone()
        .unwrap_or_else(|| core.response_format.clone());
    let format = if tools.is_empty() {
        base_format.clone()
    } else {
        base_format.with_tool_fields()
    };

    Ok(Call {
        core,
        capability,
        client,
        base_format,
        format,
        tools,
    })
}

/// Runs the requested tool and renders the outcome as the next user turn.
/// Invocation errors are reported back to the model instead of failing the call.
async fn dispatch(call: &Call<'_>, tool_call: &ToolCall, query: &str) -> String {
    let outcome = if call.tools.iter().any(|t| t == &tool_call.tool_name) {
        call.core
            .registry
            .invoke(&tool_call.tool_name, tool_call.method(), &tool_call.arguments())
            .await
    } else {
        Err(OrchestrationError::ToolNotFound(tool_call.tool_name.clone()))
    };

    match outcome {
        Ok(value) => format!(
            "You called the tool: {tool_call}\nThe tool returned: {}\nUse these results to answer the following query:\n{query}",
            render_text(&value)
        ),
        Err(e) => {
            log::warn!("{}.{}: tool call {tool_call} failed: {e}", call.core.name, call.capability);
            format!(
                "You called the tool: {tool_call}\nThe call failed: {e}\nAnswer the following query, correcting the tool call if needed:\n{query}"
            )
        }
    }
}

async fn save(core: &OperatorCore, capability: &str, message: &Message) {
    let Some(store) = &core.store else {
        return;
    };
    let record = StoredMessage::new(core.id, &core.name, capability, message.clone());
    if let Err(e) = store.save(record).await {
        log::warn!("{}.{}: failed to store message: {e}", core.name, capability);
    }
}

fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
