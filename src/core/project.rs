//! The linear software project: plan, implement component by component, integrate.
//!
//! A [`Project`] drives two operators, an executive (built with
//! [`roles::executive`](crate::core::operator::roles::executive)) and a developer
//! ([`roles::developer`](crate::core::operator::roles::developer)), strictly one call at a
//! time. Every call's result is streamed as a [`ProjectEvent`] the moment it arrives.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::arguments::{Arguments, render_text};
use crate::core::error::{OrchestrationError, Result};
use crate::core::message::{Message, MessageFormat, formats};
use crate::core::operator::roles::NO_QUESTION;
use crate::core::operator::{CallOptions, Operator};

// ============================================================================
// Configuration and state
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Question/answer rounds per component before implementing it (default: 0)
    pub clarification_rounds: usize,
    /// Capacity of the event channel (default: 32)
    pub channel_capacity: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            clarification_rounds: 0,
            channel_capacity: 32,
        }
    }
}

impl ProjectConfig {
    pub fn with_clarification_rounds(mut self, rounds: usize) -> Self {
        self.clarification_rounds = rounds;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    /// Spawned, waiting for the runtime to pick it up
    Ready,
    Working,
    Finished,
    /// A call failed or the consumer went away
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectPhase {
    Planning,
    /// Clarifying, implementing or summarizing the component at this index.
    Executing(usize),
    Integrating,
}

/// One operator call of the run, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectEvent {
    /// Name of the operator that answered.
    pub role: String,
    pub operator_id: Uuid,
    pub capability: String,
    pub phase: ProjectPhase,
    pub message: Message,
}

// ============================================================================
// Project
// ============================================================================

pub struct Project {
    id: Uuid,
    starting_prompt: String,
    executive: Operator,
    developer: Operator,
    options: CallOptions,
    config: ProjectConfig,
    created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(starting_prompt: impl Into<String>, executive: Operator, developer: Operator) -> Self {
        Self {
            id: Uuid::new_v4(),
            starting_prompt: starting_prompt.into(),
            executive,
            developer,
            options: CallOptions::new(),
            config: ProjectConfig::default(),
            created_at: Utc::now(),
        }
    }

    /// Options shared by every call. The response format is always set per step.
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_config(mut self, config: ProjectConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn starting_prompt(&self) -> &str {
        &self.starting_prompt
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Spawn the run on the current tokio runtime.
    pub fn run(self) -> Result<ProjectRun> {
        let runtime =
            Handle::try_current().map_err(|e| OrchestrationError::ExecutorStopped(e.to_string()))?;
        let (sender, receiver) = mpsc::channel(self.config.channel_capacity.max(1));
        let (status_tx, status) = watch::channel(ProjectStatus::Ready);
        let id = self.id;
        let started_at = Utc::now();
        let handle = runtime.spawn(drive(self, sender, status_tx));
        Ok(ProjectRun {
            id,
            started_at,
            receiver,
            status,
            handle,
        })
    }

    async fn walk(&self, out: &mpsc::Sender<Result<ProjectEvent>>) -> Result<(), Halt> {
        let (exec, dev) = (&self.executive, &self.developer);

        let plan = self
            .step(
                out,
                exec,
                ProjectPhase::Planning,
                "plan_components",
                Arguments::new().with("starting_prompt", self.starting_prompt.as_str()),
                formats::planned_components(),
            )
            .await?;
        let components: Vec<Value> = plan
            .get("components")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        log::info!("Project {} planned {} component(s)", self.id, components.len());

        let mut summary = String::new();
        let mut implementations = Vec::with_capacity(components.len());

        for (i, component) in components.iter().enumerate() {
            let phase = ProjectPhase::Executing(i);
            let mut context = format!(
                "Starting Prompt:\n{}\nPrevious Components summarized:\n{}\nCurrent Component: {}",
                self.starting_prompt,
                summary,
                render_text(component)
            );

            for _ in 0..self.config.clarification_rounds {
                let asked = self
                    .step(
                        out,
                        dev,
                        phase,
                        "ask_question",
                        Arguments::new().with("context", context.as_str()),
                        formats::text(),
                    )
                    .await?;
                let question = asked.to_string();
                if question.contains(NO_QUESTION) {
                    break;
                }
                let answer = self
                    .step(
                        out,
                        exec,
                        phase,
                        "answer_question",
                        Arguments::new()
                            .with("context", context.as_str())
                            .with("question", question.as_str()),
                        formats::text(),
                    )
                    .await?;
                context.push_str(&format!("\nQuestion: {question}\nAnswer: {answer}"));
            }

            let file = self
                .step(
                    out,
                    dev,
                    phase,
                    "implement_component",
                    Arguments::new().with("context", context),
                    formats::project_file(),
                )
                .await?;
            let summarized = self
                .step(
                    out,
                    exec,
                    phase,
                    "generate_summary",
                    Arguments::new()
                        .with("summary", summary.as_str())
                        .with("implementation", render_text(&file.content())),
                    formats::summary(),
                )
                .await?;
            summary = summarized
                .get("summary")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(render_text).collect::<Vec<_>>().join("\n"))
                .unwrap_or_default();
            implementations.push(file.content());
        }

        self.step(
            out,
            dev,
            ProjectPhase::Integrating,
            "integrate_components",
            Arguments::new()
                .with("planned_components", components)
                .with("implementations", implementations)
                .with("idea", self.starting_prompt.as_str()),
            formats::project_directory(),
        )
        .await?;
        Ok(())
    }

    async fn step(
        &self,
        out: &mpsc::Sender<Result<ProjectEvent>>,
        operator: &Operator,
        phase: ProjectPhase,
        capability: &str,
        args: Arguments,
        format: MessageFormat,
    ) -> Result<Message, Halt> {
        log::debug!("Project {} {:?}: {}.{}", self.id, phase, operator.name(), capability);
        let options = self
            .options
            .merged(&CallOptions::new().with_response_format(format));
        let message = operator.invoke(capability, args, options).await?;

        let event = ProjectEvent {
            role: operator.name().to_string(),
            operator_id: operator.id(),
            capability: capability.to_string(),
            phase,
            message: message.clone(),
        };
        out.send(Ok(event)).await.map_err(|_| Halt::Disconnected)?;
        Ok(message)
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("starting_prompt", &self.starting_prompt)
            .field("executive", &self.executive.name())
            .field("developer", &self.developer.name())
            .field("config", &self.config)
            .finish()
    }
}

enum Halt {
    Failed(OrchestrationError),
    Disconnected,
}

impl From<OrchestrationError> for Halt {
    fn from(err: OrchestrationError) -> Self {
        Halt::Failed(err)
    }
}

async fn drive(
    project: Project,
    events: mpsc::Sender<Result<ProjectEvent>>,
    status: watch::Sender<ProjectStatus>,
) {
    status.send_replace(ProjectStatus::Working);
    log::info!("Project {} started", project.id);

    match project.walk(&events).await {
        Ok(()) => {
            log::info!("Project {} finished", project.id);
            status.send_replace(ProjectStatus::Finished);
        }
        Err(Halt::Failed(err)) => {
            log::warn!("Project {} failed: {err}", project.id);
            status.send_replace(ProjectStatus::Failed);
            let _ = events.send(Err(err)).await;
        }
        Err(Halt::Disconnected) => {
            log::warn!("Project {} abandoned: event receiver dropped", project.id);
            status.send_replace(ProjectStatus::Failed);
        }
    }
}

// ============================================================================
// Run handle
// ============================================================================

/// A running project. Yields every call's result in order; a failure is the last item.
pub struct ProjectRun {
    id: Uuid,
    started_at: DateTime<Utc>,
    receiver: mpsc::Receiver<Result<ProjectEvent>>,
    status: watch::Receiver<ProjectStatus>,
    handle: JoinHandle<()>,
}

impl ProjectRun {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> ProjectStatus {
        *self.status.borrow()
    }

    /// A receiver that observes status changes while the run streams.
    pub fn watch_status(&self) -> watch::Receiver<ProjectStatus> {
        self.status.clone()
    }

    pub async fn next_event(&mut self) -> Option<Result<ProjectEvent>> {
        self.receiver.recv().await
    }

    /// Wait for the run to end, returning every event or the error that stopped it.
    pub async fn collect_events(mut self) -> Result<Vec<ProjectEvent>> {
        let mut events = Vec::new();
        while let Some(event) = self.receiver.recv().await {
            events.push(event?);
        }
        self.handle
            .await
            .map_err(|e| OrchestrationError::ExecutorStopped(e.to_string()))?;
        Ok(events)
    }
}

impl fmt::Debug for ProjectRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectRun")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("status", &self.status())
            .finish()
    }
}

impl Stream for ProjectRun {
    type Item = Result<ProjectEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
