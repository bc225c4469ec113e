//! Response grammars: turning a model's raw reply into a [`ParsedResponse`].
//!
//! Three textual conventions are supported, each paired with the system
//! prompt that teaches it to the model:
//!
//! - [`ResponseGrammar::Json`]: a `{"thought", "actions"}` object
//! - [`ResponseGrammar::Xml`]: a `<response>` document
//! - [`ResponseGrammar::CodeCall`]: `Thought: / Action: call(...) / End Action`
//!
//! [`ResponseGrammar::parse`] never fails. A reply that cannot be read is
//! recovered into an apology thought with no actions, which the loop
//! treats as a final answer.

mod code_call;
mod json;
mod prompt;
mod xml;

use std::collections::HashMap;

use ivan_config::GrammarKind;
use ivan_core::action::ParsedResponse;
use ivan_core::error::GrammarParseError;
use ivan_core::tool::{ToolDefinition, ToolRegistry};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseGrammar {
    Json,
    Xml,
    /// Positional call arguments are named from `signatures`.
    CodeCall {
        signatures: HashMap<String, Vec<String>>,
    },
}

impl ResponseGrammar {
    /// A code-call grammar that knows no signatures; positional arguments
    /// become `param_<i>`.
    pub fn code_call() -> Self {
        ResponseGrammar::CodeCall {
            signatures: HashMap::new(),
        }
    }

    /// Build the grammar for `kind`, taking code-call signatures from `tools`.
    pub fn for_kind(kind: GrammarKind, tools: &ToolRegistry) -> Self {
        match kind {
            GrammarKind::Json => ResponseGrammar::Json,
            GrammarKind::Xml => ResponseGrammar::Xml,
            GrammarKind::CodeCall => ResponseGrammar::CodeCall {
                signatures: tools.signatures(),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseGrammar::Json => "json",
            ResponseGrammar::Xml => "xml",
            ResponseGrammar::CodeCall { .. } => "code_call",
        }
    }

    /// Parse a reply, exposing the failure class.
    pub fn try_parse(&self, raw: &str) -> Result<ParsedResponse, GrammarParseError> {
        match self {
            ResponseGrammar::Json => json::parse(raw),
            ResponseGrammar::Xml => xml::parse(raw),
            ResponseGrammar::CodeCall { signatures } => code_call::parse(raw, signatures),
        }
    }

    /// Parse a reply, recovering any failure into an apology thought.
    pub fn parse(&self, raw: &str) -> ParsedResponse {
        self.try_parse(raw).unwrap_or_else(|err| {
            warn!(grammar = self.name(), error = %err, "Could not parse model reply");
            ParsedResponse::from_parse_error(&err)
        })
    }

    /// The system prompt that teaches this grammar, listing `tools`.
    pub fn system_prompt(&self, tools: &[ToolDefinition]) -> String {
        match self {
            ResponseGrammar::Json => prompt::json(tools),
            ResponseGrammar::Xml => prompt::xml(tools),
            ResponseGrammar::CodeCall { .. } => prompt::code_call(tools),
        }
    }

    /// A reply in this grammar that ends the run with `message`.
    pub fn sentinel_reply(&self, message: &str) -> String {
        match self {
            ResponseGrammar::Json => json::sentinel_reply(message),
            ResponseGrammar::Xml => xml::sentinel_reply(message),
            ResponseGrammar::CodeCall { .. } => code_call::sentinel_reply(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivan_core::action::SentinelFallback;

    fn all() -> Vec<ResponseGrammar> {
        vec![
            ResponseGrammar::Json,
            ResponseGrammar::Xml,
            ResponseGrammar::code_call(),
        ]
    }

    #[test]
    fn empty_input_recovers() {
        for grammar in all() {
            let parsed = grammar.parse("");
            assert!(parsed.actions.is_empty(), "{}", grammar.name());
            assert!(!parsed.thought_text().is_empty(), "{}", grammar.name());
        }
    }

    #[test]
    fn garbage_input_recovers() {
        for grammar in all() {
            let parsed = grammar.parse("not json or xml or a call");
            assert!(parsed.actions.is_empty(), "{}", grammar.name());
            assert!(parsed.thought_text().starts_with("I apologize"), "{}", grammar.name());
        }
    }

    #[test]
    fn apology_is_stable_per_failure_class() {
        let a = ResponseGrammar::Json.parse("{broken");
        let b = ResponseGrammar::Json.parse("{ also: broken }");
        assert_eq!(a.thought, ResponseGrammar::Json.parse("no braces").thought);
        assert_ne!(a.thought, b.thought);
        assert!(b.thought_text().contains("malformed"));
    }

    #[test]
    fn try_parse_exposes_failure_class() {
        assert!(matches!(
            ResponseGrammar::Xml.try_parse("nothing"),
            Err(GrammarParseError::NoDelimiterFound { grammar: "XML" })
        ));
    }

    #[test]
    fn parse_is_idempotent() {
        let raw = r#"{"thought": "t", "actions": [{"name": "get_news"}]}"#;
        assert_eq!(ResponseGrammar::Json.parse(raw), ResponseGrammar::Json.parse(raw));
    }

    #[test]
    fn sentinel_reply_terminates_in_every_grammar() {
        for grammar in all() {
            let parsed = grammar.parse(&grammar.sentinel_reply("Hold, don't sell."));
            assert_eq!(
                parsed.terminal_message(SentinelFallback::Thought).as_deref(),
                Some("Hold, don't sell."),
                "{}",
                grammar.name()
            );
        }
    }

    #[test]
    fn for_kind_takes_signatures_from_registry() {
        let registry = ivan_tools::default_registry();
        match ResponseGrammar::for_kind(GrammarKind::CodeCall, &registry) {
            ResponseGrammar::CodeCall { signatures } => {
                assert_eq!(signatures["get_coin_price"][0], "symbol");
            }
            other => panic!("expected code_call, got {other:?}"),
        }
        assert_eq!(
            ResponseGrammar::for_kind(GrammarKind::Xml, &registry),
            ResponseGrammar::Xml
        );
    }
}
