//! Action and Thought value types extracted from a model reply.
//!
//! A reply is reduced to a [`ParsedResponse`]: an optional free-text
//! [`Thought`] and an ordered list of [`Action`]s. These types carry no
//! behaviour beyond small accessors; parsing lives in the agent crate and
//! execution in the [`ToolRegistry`](crate::tool::ToolRegistry).

use serde::{Deserialize, Serialize};

use crate::error::GrammarParseError;

/// Name of the sentinel action that hands a message back to the user.
pub const RESPOND_TO_USER: &str = "respond_to_user";

/// Spelling of the sentinel used by the original prompt set.
/// Canonicalised to [`RESPOND_TO_USER`] whenever an [`Action`] is built.
pub const LEGACY_RESPOND_TO_USER: &str = "response_to_user";

/// The argument of an action: a single string or named parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionArgument {
    /// A bare argument, e.g. `"BTC"` for `get_coin_price`.
    Text(String),
    /// Named parameters, e.g. `{"symbol": "AAPL", "days": 7}`.
    Params(serde_json::Map<String, serde_json::Value>),
}

impl ActionArgument {
    /// Render the argument as a user-visible message.
    ///
    /// Named parameters prefer a `message` entry, then a lone string value,
    /// and otherwise fall back to their JSON rendering.
    pub fn as_message(&self) -> String {
        match self {
            ActionArgument::Text(text) => text.clone(),
            ActionArgument::Params(params) => {
                if let Some(serde_json::Value::String(m)) = params.get("message") {
                    return m.clone();
                }
                match params.values().next() {
                    Some(serde_json::Value::String(only)) if params.len() == 1 => only.clone(),
                    _ => serde_json::Value::Object(params.clone()).to_string(),
                }
            }
        }
    }
}

impl From<&str> for ActionArgument {
    fn from(s: &str) -> Self {
        ActionArgument::Text(s.to_string())
    }
}

impl From<String> for ActionArgument {
    fn from(s: String) -> Self {
        ActionArgument::Text(s)
    }
}

/// A single requested tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Tool name; opaque to the parser, never empty.
    pub name: String,

    /// Optional argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<ActionArgument>,
}

impl Action {
    /// Build an action, canonicalising the legacy sentinel spelling.
    pub fn new(name: impl Into<String>, argument: Option<ActionArgument>) -> Self {
        let name = name.into();
        let name = if name == LEGACY_RESPOND_TO_USER {
            RESPOND_TO_USER.to_string()
        } else {
            name
        };
        Self { name, argument }
    }

    /// Shorthand for an argument-less action.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    /// Shorthand for an action with a bare string argument.
    pub fn with_text(name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self::new(name, Some(ActionArgument::Text(argument.into())))
    }

    /// Is this the `respond_to_user` sentinel?
    pub fn is_sentinel(&self) -> bool {
        self.name == RESPOND_TO_USER
    }
}

/// Free-text reasoning that accompanies a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Thought(String);

impl Thought {
    /// Wrap a thought. Blank text yields `None`.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Thought {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The structured form of one model reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<Thought>,

    #[serde(default)]
    pub actions: Vec<Action>,
}

impl ParsedResponse {
    pub fn new(thought: Option<Thought>, actions: Vec<Action>) -> Self {
        Self { thought, actions }
    }

    /// A reply carrying only a thought (a terminal answer).
    pub fn thought_only(text: impl Into<String>) -> Self {
        Self {
            thought: Thought::new(text),
            actions: Vec::new(),
        }
    }

    /// Recover a parse failure into a terminal apology.
    pub fn from_parse_error(err: &GrammarParseError) -> Self {
        Self::thought_only(err.apology())
    }

    /// The thought text, or `""`.
    pub fn thought_text(&self) -> &str {
        self.thought.as_ref().map(Thought::as_str).unwrap_or("")
    }

    /// Is the action list exactly one `respond_to_user`?
    pub fn is_lone_sentinel(&self) -> bool {
        matches!(self.actions.as_slice(), [only] if only.is_sentinel())
    }

    /// Whether the loop must stop on this reply instead of dispatching.
    pub fn is_terminal(&self) -> bool {
        self.actions.is_empty() || self.is_lone_sentinel()
    }
}

/// What a `respond_to_user` action without an argument answers with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelFallback {
    /// Use the reply's thought text.
    #[default]
    Thought,
    /// Answer with an empty string.
    Empty,
}

impl ParsedResponse {
    /// The user-visible answer of a terminal reply.
    ///
    /// The sentinel's argument wins; otherwise the thought (subject to
    /// `fallback` when a sentinel was present), otherwise an empty string.
    /// Returns `None` for non-terminal replies.
    pub fn terminal_message(&self, fallback: SentinelFallback) -> Option<String> {
        if self.actions.is_empty() {
            return Some(self.thought_text().to_string());
        }
        if !self.is_lone_sentinel() {
            return None;
        }
        let sentinel = &self.actions[0];
        Some(match (&sentinel.argument, fallback) {
            (Some(arg), _) => arg.as_message(),
            (None, SentinelFallback::Thought) => self.thought_text().to_string(),
            (None, SentinelFallback::Empty) => String::new(),
        })
    }
}
