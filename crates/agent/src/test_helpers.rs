//! Shared test helpers for loop tests.

use ivan_core::backend::{CompletionRequest, CompletionResponse, ModelBackend, Usage};
use ivan_core::error::BackendError;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A backend that plays back a script of replies and records every request.
///
/// Panics if more calls are made than replies provided.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies that all succeed.
    pub fn replies<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self::new(texts.into_iter().map(|t| Ok(t.into())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The user message of the `n`th request.
    pub fn user_content(&self, n: usize) -> String {
        let requests = self.requests.lock().unwrap();
        requests[n]
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    pub fn request(&self, n: usize) -> CompletionRequest {
        self.requests.lock().unwrap()[n].clone()
    }
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedBackend: no more replies"));
        reply.map(|content| CompletionResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "scripted-model".into(),
        })
    }
}

/// A backend that always repeats the same reply.
pub struct RepeatingBackend {
    reply: String,
    calls: Mutex<usize>,
}

impl RepeatingBackend {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ModelBackend for RepeatingBackend {
    fn name(&self) -> &str {
        "repeating"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
        *self.calls.lock().unwrap() += 1;
        Ok(CompletionResponse::text(self.reply.clone(), "repeating-model"))
    }
}

/// A backend that never answers.
pub struct HangingBackend;

#[async_trait::async_trait]
impl ModelBackend for HangingBackend {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
        std::future::pending().await
    }
}
