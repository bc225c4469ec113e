//! # IVAN Core
//!
//! Domain types, traits, and error definitions for the IVAN financial
//! assistant. This crate has **no transport or parsing code**: it defines
//! the vocabulary every other crate speaks.
//!
//! ## Layout
//!
//! - [`action`]: `Action`, `Thought`, `ParsedResponse`, the sentinel
//! - [`context`]: per-request `ConversationContext`
//! - [`backend`]: the `ModelBackend` trait the loop calls
//! - [`tool`]: the `Tool` trait and the `ToolRegistry` that dispatches actions
//! - [`event`]: the domain event bus
//! - [`error`]: the error taxonomy

pub mod action;
pub mod backend;
pub mod context;
pub mod error;
pub mod event;
pub mod message;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use action::{
    Action, ActionArgument, ParsedResponse, SentinelFallback, Thought, RESPOND_TO_USER,
};
pub use backend::{CompletionRequest, CompletionResponse, ModelBackend, Usage};
pub use context::ConversationContext;
pub use error::{BackendError, Error, GrammarParseError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{ConversationId, Message, Role};
pub use tool::{Tool, ToolDefinition, ToolRegistry, ToolResult};
