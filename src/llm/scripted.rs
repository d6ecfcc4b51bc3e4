//! A deterministic client that replays canned responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{CompletionRequest, LLMError, LanguageModelClient};

type ResponderFn = dyn Fn(&CompletionRequest) -> Result<Value, LLMError> + Send + Sync;

enum Responder {
    Queue(Mutex<VecDeque<Result<Value, LLMError>>>),
    Func(Arc<ResponderFn>),
}

/// Replays queued payloads in order, or answers through a closure.
///
/// Every request is recorded so callers can inspect what the operator sent.
pub struct ScriptedClient {
    model: String,
    responder: Responder,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    /// An empty script. Queue responses with [`respond`](Self::respond).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            responder: Responder::Queue(Mutex::new(VecDeque::new())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request by calling `f`.
    pub fn from_fn<F>(model: impl Into<String>, f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<Value, LLMError> + Send + Sync + 'static,
    {
        Self {
            model: model.into(),
            responder: Responder::Func(Arc::new(f)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a payload. Ignored for closure-backed clients.
    pub fn respond(self, payload: impl Into<Value>) -> Self {
        self.push(Ok(payload.into()));
        self
    }

    /// Queue a failure.
    pub fn fail(self, error: LLMError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Responses still waiting in the queue.
    pub fn remaining(&self) -> usize {
        match &self.responder {
            Responder::Queue(queue) => lock(queue).len(),
            Responder::Func(_) => 0,
        }
    }

    fn push(&self, response: Result<Value, LLMError>) {
        if let Responder::Queue(queue) = &self.responder {
            lock(queue).push_back(response);
        }
    }
}

#[async_trait]
impl LanguageModelClient for ScriptedClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Value, LLMError> {
        let response = match &self.responder {
            Responder::Queue(queue) => lock(queue).pop_front().unwrap_or_else(|| {
                Err(LLMError::InvalidResponse(format!(
                    "script for '{}' is exhausted",
                    self.model
                )))
            }),
            Responder::Func(f) => f(&request),
        };
        lock(&self.requests).push(request);
        response
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
