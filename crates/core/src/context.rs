//! Per-message conversation state threaded through the agent loop.

use serde::{Deserialize, Serialize};

use crate::message::{ConversationId, Message};

/// State of one in-flight request.
///
/// Created per inbound user message and owned by exactly one loop run.
/// The loop replaces `content` with a synthesised results message after
/// every non-terminal cycle and bumps `cycle_count`; nothing else mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Session identifier, used to correlate logs and events.
    pub session_id: ConversationId,

    /// The text sent to the model on the next cycle.
    pub content: String,

    /// The end user this request belongs to.
    pub user_id: String,

    /// Completed non-terminal cycles.
    #[serde(default)]
    pub cycle_count: u32,

    /// Caller-supplied metadata, carried untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Prior chat turns sent ahead of `content` on every cycle.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,
}

impl ConversationContext {
    pub fn new(content: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: ConversationId::new(),
            content: content.into(),
            user_id: user_id.into(),
            cycle_count: 0,
            metadata: serde_json::Map::new(),
            history: Vec::new(),
        }
    }

    pub fn with_session(mut self, session_id: ConversationId) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_starts_at_cycle_zero() {
        let ctx = ConversationContext::new("price of BTC?", "user1");
        assert_eq!(ctx.cycle_count, 0);
        assert_eq!(ctx.user_id, "user1");
        assert!(ctx.metadata.is_empty());
    }

    #[test]
    fn metadata_is_carried() {
        let ctx = ConversationContext::new("hi", "u")
            .with_metadata("chat_id", serde_json::json!(123));
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["metadata"]["chat_id"], 123);
    }
}
