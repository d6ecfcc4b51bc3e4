//! Operators: LLM-backed agents with a fixed table of capabilities.
//!
//! Every capability is registered by name when the operator is built. Prompt
//! capabilities turn their arguments into a query that goes through the completion
//! pipeline; primitive capabilities produce a [`Message`] directly.

mod options;
mod pipeline;
pub mod roles;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use uuid::Uuid;

use crate::core::arguments::Arguments;
use crate::core::delegation::{DelegationHandle, TaskQueue, UnitOfWork};
use crate::core::error::{OrchestrationError, Result};
use crate::core::message::{Message, MessageFormat};
use crate::core::store::MessageStore;
use crate::core::tool::ToolRegistry;
use crate::llm::LanguageModelClient;

pub use options::CallOptions;
pub use pipeline::CallPhase;

// ============================================================================
// Configuration
// ============================================================================

/// Limits applied to every pipeline run of an operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Tool calls allowed in one capability call (default: 3)
    pub max_tool_iterations: usize,
    /// Re-prompts after a response fails schema validation (default: 2)
    pub max_schema_retries: usize,
    /// How long [`Operator::resolve`] waits on a delegated call (default: 300s)
    pub delegation_timeout: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 3,
            max_schema_retries: 2,
            delegation_timeout: Duration::from_secs(300),
        }
    }
}

impl OperatorConfig {
    pub fn with_max_tool_iterations(mut self, limit: usize) -> Self {
        self.max_tool_iterations = limit;
        self
    }

    pub fn with_max_schema_retries(mut self, retries: usize) -> Self {
        self.max_schema_retries = retries;
        self
    }

    pub fn with_delegation_timeout(mut self, timeout: Duration) -> Self {
        self.delegation_timeout = timeout;
        self
    }
}

// ============================================================================
// Capabilities
// ============================================================================

type PromptFn = dyn Fn(&Arguments) -> Result<String> + Send + Sync;
type PrimitiveFn = dyn Fn(&Arguments) -> Result<Message> + Send + Sync;

/// An entry of the operator's dispatch table.
#[derive(Clone)]
pub enum Capability {
    /// Builds the query text sent through the completion pipeline.
    Prompt(Arc<PromptFn>),
    /// Produces the result without a model call.
    Primitive(Arc<PrimitiveFn>),
}

impl Capability {
    pub fn prompt<F>(f: F) -> Self
    where
        F: Fn(&Arguments) -> Result<String> + Send + Sync + 'static,
    {
        Capability::Prompt(Arc::new(f))
    }

    pub fn primitive<F>(f: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Message> + Send + Sync + 'static,
    {
        Capability::Primitive(Arc::new(f))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Capability::Primitive(_))
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Prompt(_) => f.write_str("Capability::Prompt"),
            Capability::Primitive(_) => f.write_str("Capability::Primitive"),
        }
    }
}

/// Result of [`Operator::call`]: either the message or a handle to a delegated run.
#[derive(Debug)]
pub enum CallOutcome {
    Ready(Message),
    Deferred(DelegationHandle),
}

impl CallOutcome {
    pub fn is_deferred(&self) -> bool {
        matches!(self, CallOutcome::Deferred(_))
    }
}

// ============================================================================
// Operator
// ============================================================================

pub(crate) struct OperatorCore {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) instructions: String,
    pub(crate) clients: HashMap<String, Arc<dyn LanguageModelClient>>,
    pub(crate) default_client: Option<String>,
    pub(crate) tools: Vec<String>,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) response_format: MessageFormat,
    pub(crate) use_tools: bool,
    pub(crate) store: Option<Arc<dyn MessageStore>>,
    pub(crate) queue: Option<Arc<dyn TaskQueue>>,
    pub(crate) run_async: bool,
    pub(crate) config: OperatorConfig,
    capabilities: BTreeMap<String, Capability>,
}

/// An agent identity with instructions, clients, tools and a capability table.
///
/// Immutable once built; clones share the same core.
#[derive(Clone)]
pub struct Operator {
    core: Arc<OperatorCore>,
}

impl Operator {
    pub fn builder(name: impl Into<String>) -> OperatorBuilder {
        OperatorBuilder::new(name)
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn instructions(&self) -> &str {
        &self.core.instructions
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.core.config
    }

    /// Tools the operator uses when `use_tools` is on.
    pub fn tools(&self) -> &[String] {
        &self.core.tools
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.core.registry
    }

    pub fn response_format(&self) -> &MessageFormat {
        &self.core.response_format
    }

    /// Capability names, sorted.
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.core.capabilities.keys().map(String::as_str)
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.core.capabilities.contains_key(name)
    }

    /// Invoke a capability and wait for its result, resolving delegated runs with the
    /// configured timeout.
    pub async fn invoke(
        &self,
        capability: &str,
        args: Arguments,
        options: CallOptions,
    ) -> Result<Message> {
        let outcome = self.call(capability, args, options).await?;
        self.resolve(outcome).await
    }

    /// Invoke a capability. In async mode the pipeline is submitted to the task queue
    /// and a [`CallOutcome::Deferred`] handle is returned instead of the message.
    pub async fn call(
        &self,
        capability: &str,
        args: Arguments,
        options: CallOptions,
    ) -> Result<CallOutcome> {
        let entry = self.core.capabilities.get(capability).ok_or_else(|| {
            OrchestrationError::UnknownCapability {
                operator: self.core.name.clone(),
                capability: capability.to_string(),
            }
        })?;

        let query = match entry {
            Capability::Primitive(f) => return f(&args).map(CallOutcome::Ready),
            Capability::Prompt(f) => f(&args)?,
        };

        if !options.run_async.unwrap_or(self.core.run_async) {
            let message = pipeline::run(&self.core, capability, query, &options).await?;
            return Ok(CallOutcome::Ready(message));
        }

        let queue = self.core.queue.clone().ok_or_else(|| {
            OrchestrationError::Delegation(format!(
                "operator '{}' has no task queue for async calls",
                self.core.name
            ))
        })?;
        let core = self.core.clone();
        let capability_name = capability.to_string();
        let work = async move { pipeline::run(&core, &capability_name, query, &options).await };
        let handle = queue.submit(UnitOfWork::new(&self.core.name, capability, work.boxed()))?;
        Ok(CallOutcome::Deferred(handle))
    }

    /// Turn an outcome into a message, waiting on deferred runs.
    pub async fn resolve(&self, outcome: CallOutcome) -> Result<Message> {
        match outcome {
            CallOutcome::Ready(message) => Ok(message),
            CallOutcome::Deferred(handle) => handle.get(self.core.config.delegation_timeout).await,
        }
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("capabilities", &self.capabilities().collect::<Vec<_>>())
            .field("tools", &self.core.tools)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Operator`].
pub struct OperatorBuilder {
    id: Option<Uuid>,
    name: String,
    instructions: String,
    clients: HashMap<String, Arc<dyn LanguageModelClient>>,
    default_client: Option<String>,
    tools: Vec<String>,
    registry: Option<Arc<ToolRegistry>>,
    response_format: MessageFormat,
    use_tools: bool,
    store: Option<Arc<dyn MessageStore>>,
    store_messages: bool,
    queue: Option<Arc<dyn TaskQueue>>,
    run_async: bool,
    config: OperatorConfig,
    capabilities: BTreeMap<String, Capability>,
}

impl OperatorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            instructions: String::new(),
            clients: HashMap::new(),
            default_client: None,
            tools: Vec::new(),
            registry: None,
            response_format: MessageFormat::text(),
            use_tools: false,
            store: None,
            store_messages: true,
            queue: None,
            run_async: false,
            config: OperatorConfig::default(),
            capabilities: BTreeMap::new(),
        }
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Register a client. The first one registered becomes the default.
    pub fn client(mut self, name: impl Into<String>, client: Arc<dyn LanguageModelClient>) -> Self {
        let name = name.into();
        if self.default_client.is_none() {
            self.default_client = Some(name.clone());
        }
        self.clients.insert(name, client);
        self
    }

    pub fn default_client(mut self, name: impl Into<String>) -> Self {
        self.default_client = Some(name.into());
        self
    }

    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tools.push(name.into());
        self
    }

    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn response_format(mut self, format: MessageFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn use_tools(mut self, use_tools: bool) -> Self {
        self.use_tools = use_tools;
        self
    }

    pub fn store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Turn persistence of results off without dropping the store.
    pub fn store_messages(mut self, enabled: bool) -> Self {
        self.store_messages = enabled;
        self
    }

    pub fn queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn run_async(mut self, run_async: bool) -> Self {
        self.run_async = run_async;
        self
    }

    pub fn config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn capability(mut self, name: impl Into<String>, capability: Capability) -> Self {
        self.capabilities.insert(name.into(), capability);
        self
    }

    /// Register a prompt capability.
    pub fn prompt<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Arguments) -> Result<String> + Send + Sync + 'static,
    {
        self.capability(name, Capability::prompt(f))
    }

    /// Register a primitive capability.
    pub fn primitive<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Message> + Send + Sync + 'static,
    {
        self.capability(name, Capability::primitive(f))
    }

    pub fn build(self) -> Result<Operator> {
        if self.capabilities.is_empty() {
            return Err(OrchestrationError::InvalidOperator(format!(
                "operator '{}' declares no capabilities",
                self.name
            )));
        }
        if let Some(default) = &self.default_client {
            if !self.clients.contains_key(default) {
                return Err(OrchestrationError::UnknownClient(default.clone()));
            }
        }
        if self.run_async && self.queue.is_none() {
            return Err(OrchestrationError::InvalidOperator(format!(
                "operator '{}' runs async but has no task queue",
                self.name
            )));
        }

        let registry = self.registry.unwrap_or_default();
        if let Some(missing) = self.tools.iter().find(|t| !registry.contains(t)) {
            return Err(OrchestrationError::ToolNotFound(missing.clone()));
        }

        let store = if self.store_messages { self.store } else { None };
        let core = OperatorCore {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            name: self.name,
            instructions: self.instructions,
            clients: self.clients,
            default_client: self.default_client,
            tools: self.tools,
            registry,
            response_format: self.response_format,
            use_tools: self.use_tools,
            store,
            queue: self.queue,
            run_async: self.run_async,
            config: self.config,
            capabilities: self.capabilities,
        };
        log::debug!(
            "Built operator '{}' ({}) with capabilities {:?}",
            core.name,
            core.id,
            core.capabilities.keys().collect::<Vec<_>>()
        );
        Ok(Operator {
            core: Arc::new(core),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::delegation::LocalTaskQueue;
    use crate::llm::ScriptedClient;
    use serde_json::json;

    fn echo_client() -> Arc<dyn LanguageModelClient> {
        Arc::new(ScriptedClient::from_fn("echo", |req| {
            Ok(json!({ "text": req.last_user().unwrap_or_default() }))
        }))
    }

    fn echo_operator() -> OperatorBuilder {
        Operator::builder("Echo")
            .client("scripted", echo_client())
            .prompt("chat", |args| args.text("message"))
            .primitive("ping", |_| Ok(Message::text("pong")))
    }

    #[test]
    fn test_build_requires_capabilities() {
        let err = Operator::builder("Empty").build().unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidOperator(_)));
    }

    #[test]
    fn test_build_rejects_unknown_tools_and_clients() {
        let err = echo_operator().tool("Abacus").build().unwrap_err();
        assert_eq!(err, OrchestrationError::ToolNotFound("Abacus".into()));

        let err = echo_operator().default_client("missing").build().unwrap_err();
        assert_eq!(err, OrchestrationError::UnknownClient("missing".into()));

        let err = echo_operator().run_async(true).build().unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidOperator(_)));
    }

    #[tokio::test]
    async fn test_dispatch_prompt_and_primitive() {
        let op = echo_operator().build().unwrap();
        let msg = op
            .invoke("chat", Arguments::new().with("message", "hello"), CallOptions::new())
            .await
            .unwrap();
        assert_eq!(msg.as_text(), Some("hello"));

        let msg = op.invoke("ping", Arguments::new(), CallOptions::new()).await.unwrap();
        assert_eq!(msg.as_text(), Some("pong"));

        let err = op
            .invoke("dance", Arguments::new(), CallOptions::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrchestrationError::UnknownCapability {
                operator: "Echo".into(),
                capability: "dance".into()
            }
        );
    }

    #[tokio::test]
    async fn test_async_call_is_deferred() {
        let op = echo_operator()
            .queue(Arc::new(LocalTaskQueue::new(1)))
            .build()
            .unwrap();
        let outcome = op
            .call(
                "chat",
                Arguments::new().with("message", "later"),
                CallOptions::new().with_run_async(true),
            )
            .await
            .unwrap();
        assert!(outcome.is_deferred());
        let msg = op.resolve(outcome).await.unwrap();
        assert_eq!(msg.as_text(), Some("later"));
    }

    #[tokio::test]
    async fn test_async_without_queue_fails() {
        let op = echo_operator().build().unwrap();
        let err = op
            .call(
                "chat",
                Arguments::new().with("message", "x"),
                CallOptions::new().with_run_async(true),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Delegation(_)));
    }
}
