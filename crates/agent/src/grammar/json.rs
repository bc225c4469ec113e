//! The JSON response grammar.
//!
//! ```text
//! {"thought": "...", "actions": [{"name": "get_coin_price", "argument": "BTC"}]}
//! ```
//!
//! Models like to wrap the object in Markdown fences and surround it with
//! prose, so the payload is whatever lies between the first `{` and the
//! last `}` once fences are gone.

use ivan_core::action::{Action, ActionArgument, ParsedResponse, Thought, RESPOND_TO_USER};
use ivan_core::error::GrammarParseError;
use serde::Deserialize;
use tracing::warn;

pub(crate) const LABEL: &str = "JSON";

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default)]
    thought: Option<String>,
    #[serde(default)]
    actions: Option<Vec<RawAction>>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    argument: Option<serde_json::Value>,
}

pub(crate) fn parse(raw: &str) -> Result<ParsedResponse, GrammarParseError> {
    let cleaned = strip_fences(raw);

    let payload = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => return Err(GrammarParseError::NoDelimiterFound { grammar: LABEL }),
    };

    let reply: RawReply =
        serde_json::from_str(payload).map_err(|e| GrammarParseError::MalformedPayload {
            grammar: LABEL,
            detail: e.to_string(),
        })?;

    let actions = reply
        .actions
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| match raw.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                Some(Action::new(name, raw.argument.and_then(into_argument)))
            }
            _ => {
                warn!(grammar = "json", "Dropping action without a name");
                None
            }
        })
        .collect();

    Ok(ParsedResponse::new(
        reply.thought.and_then(Thought::new),
        actions,
    ))
}

/// Remove Markdown code fences, case-insensitively.
///
/// When a ```` ```json ```` fence is present only its body is kept.
fn strip_fences(raw: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `raw`.
    let lower = raw.to_ascii_lowercase();
    let body = match lower.find(JSON_FENCE) {
        Some(open) => {
            let after = open + JSON_FENCE.len();
            match lower[after..].find(FENCE) {
                Some(close) => &raw[after..after + close],
                None => &raw[after..],
            }
        }
        None => raw,
    };
    body.replace(FENCE, "").trim().to_string()
}

fn into_argument(value: serde_json::Value) -> Option<ActionArgument> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(ActionArgument::Text(s)),
        serde_json::Value::Object(map) => Some(ActionArgument::Params(map)),
        other => Some(ActionArgument::Text(other.to_string())),
    }
}

pub(crate) fn sentinel_reply(message: &str) -> String {
    serde_json::json!({
        "thought": "",
        "actions": [{ "name": RESPOND_TO_USER, "argument": message }]
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_payload_with_leading_prose() {
        let raw = "Sure, here is my plan:\n```json\n{\"thought\":\"t\",\"actions\":[{\"name\":\"x\",\"argument\":\"y\"}]}\n```\nLet me know!";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.thought_text(), "t");
        assert_eq!(parsed.actions, vec![Action::with_text("x", "y")]);
    }

    #[test]
    fn uppercase_fence_is_stripped() {
        let raw = "```JSON\n{\"thought\": \"ok\", \"actions\": []}\n```";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.thought_text(), "ok");
        assert!(parsed.actions.is_empty());
    }

    #[test]
    fn bare_object_without_fences() {
        let raw = r#"{"actions": [{"name": "get_market_news"}]}"#;
        let parsed = parse(raw).unwrap();
        assert!(parsed.thought.is_none());
        assert_eq!(parsed.actions, vec![Action::named("get_market_news")]);
    }

    #[test]
    fn missing_keys_default_to_empty() {
        let parsed = parse("{}").unwrap();
        assert_eq!(parsed, ParsedResponse::default());
    }

    #[test]
    fn argument_shapes() {
        let raw = r#"{"actions": [
            {"name": "a", "argument": {"symbol": "AAPL", "days": 7}},
            {"name": "b", "argument": 42},
            {"name": "c", "argument": null},
            {"name": "d", "argument": true}
        ]}"#;
        let parsed = parse(raw).unwrap();
        match &parsed.actions[0].argument {
            Some(ActionArgument::Params(p)) => {
                assert_eq!(p["symbol"], "AAPL");
                assert_eq!(p["days"], 7);
            }
            other => panic!("expected params, got {other:?}"),
        }
        assert_eq!(parsed.actions[1].argument, Some(ActionArgument::Text("42".into())));
        assert_eq!(parsed.actions[2].argument, None);
        assert_eq!(parsed.actions[3].argument, Some(ActionArgument::Text("true".into())));
    }

    #[test]
    fn legacy_sentinel_name_is_canonical() {
        let raw = r#"{"thought": "", "actions": [{"name": "response_to_user", "argument": "hi"}]}"#;
        let parsed = parse(raw).unwrap();
        assert!(parsed.is_lone_sentinel());
    }

    #[test]
    fn nameless_actions_are_dropped() {
        let raw = r#"{"actions": [{"argument": "BTC"}, {"name": "  "}, {"name": "get_news"}]}"#;
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.actions, vec![Action::named("get_news")]);
    }

    #[test]
    fn no_braces_is_no_delimiter() {
        let err = parse("I think BTC will go up").unwrap_err();
        assert_eq!(err, GrammarParseError::NoDelimiterFound { grammar: LABEL });

        // A closing brace before the opening one does not delimit anything.
        assert!(matches!(
            parse("} oops {"),
            Err(GrammarParseError::NoDelimiterFound { .. })
        ));
    }

    #[test]
    fn broken_object_is_malformed() {
        // The last `}` closes the inner action, leaving the array open.
        let err = parse(r#"{"thought": "t", "actions": [{"name": "x"}"#).unwrap_err();
        assert!(matches!(err, GrammarParseError::MalformedPayload { .. }));

        let err = parse(r#"{"thought": 5}"#).unwrap_err();
        assert!(matches!(err, GrammarParseError::MalformedPayload { .. }));

        let err = parse(r#"{"actions": "get_news"}"#).unwrap_err();
        assert!(matches!(err, GrammarParseError::MalformedPayload { .. }));
    }

    #[test]
    fn sentinel_reply_parses_back() {
        let reply = sentinel_reply("Buy \"low\", sell high");
        let parsed = parse(&reply).unwrap();
        assert!(parsed.is_lone_sentinel());
        assert_eq!(
            parsed.actions[0].argument,
            Some(ActionArgument::Text("Buy \"low\", sell high".into()))
        );
    }
}
