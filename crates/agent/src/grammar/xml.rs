//! The XML response grammar.
//!
//! ```text
//! <response>
//!     <thought>...</thought>
//!     <actions>
//!         <action><name>get_coin_price</name><argument>BTC</argument></action>
//!     </actions>
//! </response>
//! ```

use ivan_core::action::{Action, ActionArgument, ParsedResponse, Thought, RESPOND_TO_USER};
use ivan_core::error::GrammarParseError;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

pub(crate) const LABEL: &str = "XML";

const OPEN: &str = "<response>";
const CLOSE: &str = "</response>";

/// A parsed element: tag name, concatenated text, child elements.
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn new(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).to_ascii_lowercase(),
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

pub(crate) fn parse(raw: &str) -> Result<ParsedResponse, GrammarParseError> {
    let span = locate_span(raw).ok_or(GrammarParseError::NoDelimiterFound { grammar: LABEL })?;
    let root = parse_tree(span).map_err(|detail| GrammarParseError::MalformedPayload {
        grammar: LABEL,
        detail,
    })?;

    let thought = root
        .child("thought")
        .and_then(|t| Thought::new(t.trimmed_text()));

    let actions = root
        .children_named("actions")
        .flat_map(|list| list.children_named("action"))
        .filter_map(|action| {
            let name = action.child("name").map(Element::trimmed_text).unwrap_or("");
            if name.is_empty() {
                warn!(grammar = "xml", "Dropping action without a name");
                return None;
            }
            Some(Action::new(name, action.child("argument").and_then(into_argument)))
        })
        .collect();

    Ok(ParsedResponse::new(thought, actions))
}

/// The first `<response>` through the last `</response>`, case-insensitively.
fn locate_span(raw: &str) -> Option<&str> {
    let lower = raw.to_ascii_lowercase();
    let start = lower.find(OPEN)?;
    let end = lower.rfind(CLOSE)? + CLOSE.len();
    (start < end).then(|| &raw[start..end])
}

/// An `<argument>` with child elements becomes named parameters; plain text
/// becomes a bare argument; an empty element is no argument at all.
fn into_argument(element: &Element) -> Option<ActionArgument> {
    if !element.children.is_empty() {
        let params = element
            .children
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    serde_json::Value::String(c.trimmed_text().to_string()),
                )
            })
            .collect();
        return Some(ActionArgument::Params(params));
    }
    let text = element.trimmed_text();
    (!text.is_empty()).then(|| ActionArgument::Text(text.to_string()))
}

fn parse_tree(xml: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Element::new(e.name().as_ref())),
            Ok(Event::Empty(e)) => attach(&mut stack, &mut root, Element::new(e.name().as_ref()))?,
            Ok(Event::End(_)) => {
                let done = stack.pop().ok_or("unexpected closing tag")?;
                attach(&mut stack, &mut root, done)?;
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| err.to_string())?;
                match stack.last_mut() {
                    Some(open) => open.text.push_str(&text),
                    None => return Err(format!("text outside the root element: {text}")),
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "error at position {}: {e}",
                    reader.buffer_position()
                ));
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    root.ok_or_else(|| "empty document".to_string())
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(format!("junk after document element: <{}>", element.name)),
    }
    Ok(())
}

pub(crate) fn sentinel_reply(message: &str) -> String {
    format!(
        "<response>\n    <thought></thought>\n    <actions>\n        <action>\n            <name>{RESPOND_TO_USER}</name>\n            <argument>{}</argument>\n        </action>\n    </actions>\n</response>",
        quick_xml::escape::escape(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_structure() {
        let raw = "<response><thought>t</thought><actions><action><name>x</name><argument>y</argument></action></actions></response>";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.thought_text(), "t");
        assert_eq!(parsed.actions, vec![Action::with_text("x", "y")]);
    }

    #[test]
    fn absent_argument_stays_absent() {
        let raw = r#"Here you go:
<response>
    <thought>The user wants Bitcoin's price and general market news.</thought>
    <actions>
        <action>
            <name>get_coin_price</name>
            <argument>BTC</argument>
        </action>
        <action>
            <name>get_market_news</name>
        </action>
    </actions>
</response>"#;
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.actions.len(), 2);
        assert_eq!(parsed.actions[0], Action::with_text("get_coin_price", "BTC"));
        assert_eq!(parsed.actions[1].name, "get_market_news");
        assert!(parsed.actions[1].argument.is_none());
    }

    #[test]
    fn empty_argument_element_is_absent() {
        let raw = "<response><actions><action><name>get_news</name><argument></argument></action><action><name>get_market_news</name><argument/></action></actions></response>";
        let parsed = parse(raw).unwrap();
        assert!(parsed.actions.iter().all(|a| a.argument.is_none()));
    }

    #[test]
    fn missing_thought_is_none() {
        let raw = "<response><actions></actions></response>";
        let parsed = parse(raw).unwrap();
        assert!(parsed.thought.is_none());
        assert!(parsed.actions.is_empty());
    }

    #[test]
    fn nested_argument_becomes_params() {
        let raw = "<response><actions><action><name>get_stock_history</name><argument><symbol>AAPL</symbol><days>7</days></argument></action></actions></response>";
        let parsed = parse(raw).unwrap();
        match &parsed.actions[0].argument {
            Some(ActionArgument::Params(p)) => {
                assert_eq!(p["symbol"], "AAPL");
                assert_eq!(p["days"], "7");
            }
            other => panic!("expected params, got {other:?}"),
        }
    }

    #[test]
    fn entities_are_unescaped() {
        let raw = "<response><actions><action><name>respond_to_user</name><argument>AT&amp;T &lt; 20</argument></action></actions></response>";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.terminal_message(Default::default()).unwrap(), "AT&T < 20");
    }

    #[test]
    fn tag_case_is_ignored() {
        let raw = "<Response><Thought>hi</Thought></Response>";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.thought_text(), "hi");
    }

    #[test]
    fn no_span_is_no_delimiter() {
        assert_eq!(
            parse("just text").unwrap_err(),
            GrammarParseError::NoDelimiterFound { grammar: LABEL }
        );
        assert!(matches!(
            parse("</response> backwards <response>"),
            Err(GrammarParseError::NoDelimiterFound { .. })
        ));
    }

    #[test]
    fn ill_formed_markup_is_malformed() {
        let raw = "<response><thought>unclosed</response>";
        assert!(matches!(
            parse(raw),
            Err(GrammarParseError::MalformedPayload { .. })
        ));

        let raw = "<response><thought>a & b</thought></response>";
        assert!(matches!(
            parse(raw),
            Err(GrammarParseError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn nameless_action_is_dropped() {
        let raw = "<response><actions><action><argument>BTC</argument></action></actions></response>";
        let parsed = parse(raw).unwrap();
        assert!(parsed.actions.is_empty());
    }

    #[test]
    fn sentinel_reply_parses_back() {
        let reply = sentinel_reply("Gold <and> silver & more");
        let parsed = parse(&reply).unwrap();
        assert!(parsed.is_lone_sentinel());
        assert_eq!(
            parsed.terminal_message(Default::default()).unwrap(),
            "Gold <and> silver & more"
        );
    }
}
