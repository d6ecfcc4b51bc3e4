use std::fmt;

use serde_json::Value;

use crate::core::arguments::Arguments;
use crate::core::error::{OrchestrationError, Result};
use crate::core::message::Message;
use crate::core::operator::{CallOptions, Operator};

/// One operator capability call inside a graph.
#[derive(Clone)]
pub struct DagNode {
    name: String,
    operator: Operator,
    task: String,
    default_args: Arguments,
    options: CallOptions,
}

impl DagNode {
    /// Fails with `UnknownCapability` when `operator` has no capability named `task`.
    pub fn new(name: impl Into<String>, operator: &Operator, task: impl Into<String>) -> Result<Self> {
        let task = task.into();
        if !operator.has_capability(&task) {
            return Err(OrchestrationError::UnknownCapability {
                operator: operator.name().to_string(),
                capability: task,
            });
        }
        Ok(Self {
            name: name.into(),
            operator: operator.clone(),
            task,
            default_args: Arguments::new(),
            options: CallOptions::new(),
        })
    }

    pub fn with_args(mut self, args: Arguments) -> Self {
        self.default_args = args;
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_args.insert(name, value);
        self
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn default_args(&self) -> &Arguments {
        &self.default_args
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// `Operator.task`, used in diagrams and logs.
    pub fn label(&self) -> String {
        format!("{}.{}", self.operator.name(), self.task)
    }

    /// Bound results override default arguments; node options override project options.
    pub(crate) async fn execute(
        &self,
        bindings: Arguments,
        project_options: &CallOptions,
    ) -> Result<Message> {
        let args = self.default_args.merged(&bindings);
        let options = project_options.merged(&self.options);
        self.operator.invoke(&self.task, args, options).await
    }
}

impl fmt::Debug for DagNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagNode")
            .field("name", &self.name)
            .field("operator", &self.operator.name())
            .field("task", &self.task)
            .field("default_args", &self.default_args)
            .finish()
    }
}
