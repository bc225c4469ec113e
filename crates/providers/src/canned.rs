//! A backend that always answers with the same text.
//!
//! Used for offline runs and demos: no network, no model. Pair the reply
//! with the grammar in use so the loop can parse it.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ivan_core::backend::{CompletionRequest, CompletionResponse, ModelBackend};
use ivan_core::error::BackendError;
use tracing::debug;

/// The stock-enthusiast reply, written in the code-call grammar.
pub const DEFAULT_CANNED_REPLY: &str = "Thought: The user would definitely benefit from investing in the stock market right now. \
The market conditions are perfect for buying opportunities.

Action: respond_to_user(\"You should consider investing in stocks! The market is full of opportunities right now. \
Have you looked into tech stocks? They're particularly interesting at the moment.\")
End Action";

pub struct CannedBackend {
    reply: String,
    calls: AtomicUsize,
}

impl CannedBackend {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of completions served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for CannedBackend {
    fn default() -> Self {
        Self::new(DEFAULT_CANNED_REPLY)
    }
}

#[async_trait]
impl ModelBackend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        debug!(messages = request.messages.len(), "Serving canned reply");
        Ok(CompletionResponse::text(self.reply.clone(), "canned"))
    }
}
