use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::dag::{DagProject, ExecutorConfig};
use crate::core::delegation::TaskQueue;
use crate::core::error::{OrchestrationError, Result};
use crate::core::operator::{CallOptions, Operator, OperatorBuilder, OperatorConfig, roles};
use crate::core::project::{Project, ProjectConfig, ProjectRun};
use crate::core::store::MessageStore;
use crate::core::tool::Tool;
use crate::core::tool::registry::ToolRegistry;
use crate::llm::LanguageModelClient;

/// Prompt used when a project is started with an empty one.
pub const HELLO_WORLD_PROMPT: &str = "Create a simple hello world program";

pub const EXECUTIVE_TITLE: &str = "exec";
pub const DEVELOPER_TITLE: &str = "dev";

/// Titles of the operators a project runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoles {
    pub executive: String,
    pub developer: String,
}

impl ProjectRoles {
    pub fn new(executive: impl Into<String>, developer: impl Into<String>) -> Self {
        Self {
            executive: executive.into(),
            developer: developer.into(),
        }
    }
}

impl Default for ProjectRoles {
    fn default() -> Self {
        Self::new(EXECUTIVE_TITLE, DEVELOPER_TITLE)
    }
}

/// Registry of operators, tools and model clients, and the entry point for projects
/// and graphs. Holds no scheduling logic of its own.
pub struct Orchestrator {
    operators: HashMap<String, Operator>,
    registry: Arc<ToolRegistry>,
    clients: Vec<(String, Arc<dyn LanguageModelClient>)>,
    store: Option<Arc<dyn MessageStore>>,
    queue: Option<Arc<dyn TaskQueue>>,
    operator_config: OperatorConfig,
    project_config: ProjectConfig,
    executor_config: ExecutorConfig,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            operators: HashMap::new(),
            registry: Arc::new(ToolRegistry::new()),
            clients: Vec::new(),
            store: None,
            queue: None,
            operator_config: OperatorConfig::default(),
            project_config: ProjectConfig::default(),
            executor_config: ExecutorConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_operator_config(mut self, config: OperatorConfig) -> Self {
        self.operator_config = config;
        self
    }

    pub fn with_project_config(mut self, config: ProjectConfig) -> Self {
        self.project_config = config;
        self
    }

    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    /// Register `client` and the default executive and developer under
    /// [`EXECUTIVE_TITLE`] and [`DEVELOPER_TITLE`].
    pub fn with_default_roles(
        mut self,
        name: impl Into<String>,
        client: Arc<dyn LanguageModelClient>,
    ) -> Result<Self> {
        self.add_client(name, client);
        let executive = roles::executive(self.operator_builder("Executive")).build()?;
        let developer = roles::developer(self.operator_builder("Developer")).build()?;
        self.add_operator(executive, EXECUTIVE_TITLE);
        self.add_operator(developer, DEVELOPER_TITLE);
        Ok(self)
    }

    /// Register `operator` under `title`, returning the operator it replaced.
    pub fn add_operator(&mut self, operator: Operator, title: impl Into<String>) -> Option<Operator> {
        let title = title.into();
        log::debug!("Registering operator '{}' as '{title}'", operator.name());
        let previous = self.operators.insert(title.clone(), operator);
        if previous.is_some() {
            log::warn!("Operator title '{title}' was already taken; replaced");
        }
        previous
    }

    pub fn add_tool(&self, tool: Tool) -> Result<()> {
        self.registry.register(tool)
    }

    /// Register a model client. The first one added is the default for new operators.
    pub fn add_client(&mut self, name: impl Into<String>, client: Arc<dyn LanguageModelClient>) {
        let name = name.into();
        self.clients.retain(|(existing, _)| *existing != name);
        log::debug!("Registering client '{name}' ({})", client.model_name());
        self.clients.push((name, client));
    }

    pub fn operator(&self, title: &str) -> Result<&Operator> {
        self.operators
            .get(title)
            .ok_or_else(|| OrchestrationError::UnknownOperator(title.to_string()))
    }

    pub fn operator_titles(&self) -> Vec<&str> {
        let mut titles: Vec<&str> = self.operators.keys().map(String::as_str).collect();
        titles.sort_unstable();
        titles
    }

    pub fn client(&self, name: &str) -> Option<Arc<dyn LanguageModelClient>> {
        self.clients
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, client)| client.clone())
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// A builder already bound to this orchestrator's clients, tools, store and queue.
    pub fn operator_builder(&self, name: impl Into<String>) -> OperatorBuilder {
        let mut builder = Operator::builder(name)
            .registry(self.registry.clone())
            .config(self.operator_config.clone());
        for (client_name, client) in &self.clients {
            builder = builder.client(client_name.clone(), client.clone());
        }
        if let Some(store) = &self.store {
            builder = builder.store(store.clone());
        }
        if let Some(queue) = &self.queue {
            builder = builder.queue(queue.clone());
        }
        builder
    }

    /// Build a project from the operators registered under `roles`.
    pub fn new_project(&self, prompt: &str, roles: &ProjectRoles) -> Result<Project> {
        let executive = self.operator(&roles.executive)?.clone();
        let developer = self.operator(&roles.developer)?.clone();
        let prompt = match prompt.trim() {
            "" => HELLO_WORLD_PROMPT,
            _ => prompt,
        };
        Ok(Project::new(prompt, executive, developer).with_config(self.project_config.clone()))
    }

    /// Start a linear project and stream its events.
    pub fn process_new_project(&self, prompt: &str, roles: &ProjectRoles) -> Result<ProjectRun> {
        let project = self.new_project(prompt, roles)?;
        log::info!(
            "Starting project {} with '{}' and '{}'",
            project.id(),
            roles.executive,
            roles.developer
        );
        project.run()
    }

    pub fn new_dag_project(&self, options: CallOptions) -> DagProject {
        DagProject::new(options).with_config(self.executor_config.clone())
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("operators", &self.operator_titles())
            .field("tools", &self.registry.names())
            .field(
                "clients",
                &self.clients.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
