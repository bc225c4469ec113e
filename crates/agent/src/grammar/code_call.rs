//! The code-call response grammar.
//!
//! ```text
//! Thought: I should look up the price first.
//! Action:
//! get_stock_price("AAPL")
//! End Action
//! ```
//!
//! The block between `Action:` and `End Action` is Python-flavoured call
//! syntax. It is tokenized and parsed by a small recursive-descent parser
//! rather than split on commas, so quoted commas and nested calls survive.
//! A reply may instead finish with `Answer: ...`.

use std::collections::HashMap;

use ivan_core::action::{Action, ActionArgument, ParsedResponse, Thought, RESPOND_TO_USER};
use ivan_core::error::GrammarParseError;
use tracing::debug;

pub(crate) const LABEL: &str = "Action";

const THOUGHT_MARKER: &str = "Thought:";
const ACTION_MARKER: &str = "Action:";
const ANSWER_MARKER: &str = "Answer:";
const END_MARKER: &str = "End Action";

pub(crate) fn parse(
    raw: &str,
    signatures: &HashMap<String, Vec<String>>,
) -> Result<ParsedResponse, GrammarParseError> {
    let thought = extract_thought(raw);

    if let Some(block) = action_block(raw) {
        let actions = parse_calls(block, signatures).map_err(|detail| {
            GrammarParseError::MalformedPayload {
                grammar: LABEL,
                detail,
            }
        })?;
        return Ok(ParsedResponse::new(thought, actions));
    }

    if let Some(at) = raw.find(ANSWER_MARKER) {
        let answer = &raw[at + ANSWER_MARKER.len()..];
        return Ok(ParsedResponse::thought_only(answer));
    }

    // No complete block: the thought alone is the reply.
    if thought.is_some() {
        return Ok(ParsedResponse::new(thought, Vec::new()));
    }

    if raw.contains(ACTION_MARKER) {
        return Err(GrammarParseError::MalformedPayload {
            grammar: LABEL,
            detail: format!("'{ACTION_MARKER}' without a closing '{END_MARKER}'"),
        });
    }

    Err(GrammarParseError::NoDelimiterFound { grammar: LABEL })
}

/// Text between `Thought:` and the next `Action:` or `Answer:`, or the end
/// of the reply.
fn extract_thought(raw: &str) -> Option<Thought> {
    let start = raw.find(THOUGHT_MARKER)? + THOUGHT_MARKER.len();
    let rest = &raw[start..];
    let end = [ACTION_MARKER, ANSWER_MARKER]
        .iter()
        .filter_map(|marker| rest.find(marker))
        .min()
        .unwrap_or(rest.len());
    Thought::new(&rest[..end])
}

/// Body of the first `Action:` ... `End Action` block.
fn action_block(raw: &str) -> Option<&str> {
    let start = raw.find(ACTION_MARKER)? + ACTION_MARKER.len();
    let end = raw[start..].find(END_MARKER)?;
    Some(raw[start..start + end].trim())
}

// ── Tokens ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Identifier, number or any other run of non-punctuation characters.
    Word(String),
    /// A quoted literal, escapes resolved.
    Str(String),
    LParen,
    RParen,
    Comma,
    Equals,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    start: usize,
    end: usize,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | ',' | '=' | '"' | '\'')
}

/// Split a block into tokens. Never fails: `#` starts a line comment and a
/// quote not closed on its own line is read as a word, so prose like
/// `I'll check` around a call does not hide the call.
fn tokenize(src: &str) -> Vec<Spanned> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let punct = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '=' => Some(Token::Equals),
            _ => None,
        };
        if let Some(token) = punct {
            chars.next();
            tokens.push(Spanned {
                token,
                start,
                end: start + 1,
            });
            continue;
        }

        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '#' {
            while chars.next_if(|&(_, ch)| ch != '\n').is_some() {}
            continue;
        }

        if c == '"' || c == '\'' {
            let mut lookahead = chars.clone();
            lookahead.next();
            if let Some((value, end)) = read_literal(&mut lookahead, c) {
                chars = lookahead;
                tokens.push(Spanned {
                    token: Token::Str(value),
                    start,
                    end,
                });
            } else {
                chars.next();
                tokens.push(Spanned {
                    token: Token::Word(c.to_string()),
                    start,
                    end: start + 1,
                });
            }
            continue;
        }

        let mut end = start;
        while let Some(&(i, ch)) = chars.peek() {
            if !is_word_char(ch) {
                break;
            }
            end = i + ch.len_utf8();
            chars.next();
        }
        tokens.push(Spanned {
            token: Token::Word(src[start..end].to_string()),
            start,
            end,
        });
    }

    tokens
}

/// Read a literal whose opening `quote` is already consumed. Returns the
/// unescaped value and the end offset, or `None` if the line ends first.
fn read_literal(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
) -> Option<(String, usize)> {
    let mut value = String::new();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next()? {
                (_, 'n') => value.push('\n'),
                (_, 't') => value.push('\t'),
                (_, esc @ ('\\' | '"' | '\'')) => value.push(esc),
                (_, other) => {
                    value.push('\\');
                    value.push(other);
                }
            },
            q if q == quote => return Some((value, i + q.len_utf8())),
            '\n' => return None,
            other => value.push(other),
        }
    }
    None
}

// ── Parser ──────────────────────────────────────────────────────────────

/// One parsed call expression.
#[derive(Debug)]
struct Call {
    name: String,
    args: Vec<(Option<String>, serde_json::Value)>,
}

struct CallParser<'a> {
    src: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> CallParser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            tokens: tokenize(src),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn next(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    /// Byte offset where the previously consumed token ended.
    fn last_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|s| s.end)
            .unwrap_or(0)
    }

    fn start_of(&self, index: usize) -> usize {
        self.tokens.get(index).map(|s| s.start).unwrap_or(self.src.len())
    }

    fn at_call(&self) -> bool {
        matches!(
            (self.peek(), self.peek_at(1)),
            (Some(Token::Word(_)), Some(Token::LParen))
        )
    }

    /// Advance to the next `word(` at the top level of the block.
    fn seek_call(&mut self) -> bool {
        while self.pos < self.tokens.len() {
            if self.at_call() {
                return true;
            }
            self.pos += 1;
        }
        false
    }

    /// `name ( [arg {, arg} [,]] )`
    fn parse_call(&mut self) -> Result<Call, String> {
        let name = match self.next().map(|s| s.token) {
            Some(Token::Word(w)) => w,
            other => return Err(format!("expected a function name, found {other:?}")),
        };
        match self.next().map(|s| s.token) {
            Some(Token::LParen) => {}
            other => return Err(format!("expected '(' after {name}, found {other:?}")),
        }

        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(Call { name, args });
        }

        loop {
            args.push(self.parse_arg()?);
            match self.next().map(|s| s.token) {
                Some(Token::Comma) => {
                    if self.peek() == Some(&Token::RParen) {
                        self.pos += 1;
                        break;
                    }
                }
                Some(Token::RParen) => break,
                None => return Err(format!("unbalanced parentheses in call to {name}")),
                Some(other) => return Err(format!("unexpected {other:?} in call to {name}")),
            }
        }

        Ok(Call { name, args })
    }

    /// `key = value` or a positional `value`.
    fn parse_arg(&mut self) -> Result<(Option<String>, serde_json::Value), String> {
        if let (Some(Token::Word(key)), Some(Token::Equals)) = (self.peek(), self.peek_at(1)) {
            let key = key.clone();
            self.pos += 2;
            return Ok((Some(key), self.parse_value()?));
        }
        Ok((None, self.parse_value()?))
    }

    /// A single literal, a nested call, or a compound expression.
    ///
    /// Nested calls and compound expressions are kept as their source text.
    fn parse_value(&mut self) -> Result<serde_json::Value, String> {
        let first = self.pos;
        let value = if self.at_call() {
            self.parse_call()?;
            serde_json::Value::String(self.src[self.start_of(first)..self.last_end()].to_string())
        } else {
            match self.next().map(|s| s.token) {
                Some(Token::Str(s)) => serde_json::Value::String(s),
                Some(Token::Word(w)) => coerce_bare_word(&w),
                Some(Token::LParen) => {
                    self.skip_group()?;
                    serde_json::Value::String(
                        self.src[self.start_of(first)..self.last_end()].to_string(),
                    )
                }
                None => return Err("unbalanced parentheses: input ended inside a call".into()),
                Some(other) => return Err(format!("expected a value, found {other:?}")),
            }
        };

        if matches!(self.peek(), Some(Token::Comma) | Some(Token::RParen) | None) {
            return Ok(value);
        }

        // Something like `7 * 2` or `price + 1`: keep the whole expression.
        while !matches!(self.peek(), Some(Token::Comma) | Some(Token::RParen) | None) {
            if self.next().map(|s| s.token) == Some(Token::LParen) {
                self.skip_group()?;
            }
        }
        Ok(serde_json::Value::String(
            self.src[self.start_of(first)..self.last_end()].trim().to_string(),
        ))
    }

    /// Consume tokens up to the `)` matching an already consumed `(`.
    fn skip_group(&mut self) -> Result<(), String> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next().map(|s| s.token) {
                Some(Token::LParen) => depth += 1,
                Some(Token::RParen) => depth -= 1,
                Some(_) => {}
                None => return Err("unbalanced parentheses".into()),
            }
        }
        Ok(())
    }
}

/// All digits → integer; exactly one `.` and otherwise digits → float;
/// anything else stays a string.
fn coerce_bare_word(word: &str) -> serde_json::Value {
    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if is_digits(word) {
        if let Ok(n) = word.parse::<i64>() {
            return serde_json::Value::from(n);
        }
    } else if word.matches('.').count() == 1 && is_digits(&word.replace('.', "")) {
        if let Some(n) = word
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return serde_json::Value::Number(n);
        }
    }
    serde_json::Value::String(word.to_string())
}

fn parse_calls(
    block: &str,
    signatures: &HashMap<String, Vec<String>>,
) -> Result<Vec<Action>, String> {
    let mut parser = CallParser::new(block);
    let mut actions = Vec::new();

    while parser.seek_call() {
        let call = parser.parse_call()?;
        actions.push(into_action(call, signatures));
    }

    if actions.is_empty() {
        return Err("no call expression in Action block".into());
    }
    debug!(grammar = "code_call", calls = actions.len(), "Parsed action block");
    Ok(actions)
}

/// Name positional arguments from the tool's signature, else `param_<i>`.
fn into_action(call: Call, signatures: &HashMap<String, Vec<String>>) -> Action {
    // `tools.get_price(...)` calls `get_price`.
    let name = call
        .name
        .rsplit('.')
        .next()
        .unwrap_or(call.name.as_str())
        .to_string();

    if call.args.is_empty() {
        return Action::new(name, None);
    }

    let params = signatures.get(&name).map(Vec::as_slice).unwrap_or(&[]);
    let map = call
        .args
        .into_iter()
        .enumerate()
        .map(|(i, (key, value))| {
            let key = key.unwrap_or_else(|| {
                params
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("param_{i}"))
            });
            (key, value)
        })
        .collect();

    Action::new(name, Some(ActionArgument::Params(map)))
}

pub(crate) fn sentinel_reply(message: &str) -> String {
    let escaped = message
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!(
        "Thought: I can answer the user directly.\nAction:\n{RESPOND_TO_USER}(\"{escaped}\")\nEnd Action"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_sigs() -> HashMap<String, Vec<String>> {
        HashMap::new()
    }

    fn sigs() -> HashMap<String, Vec<String>> {
        HashMap::from([
            ("get_stock_price".to_string(), vec!["symbol".to_string()]),
            (
                "get_stock_history".to_string(),
                vec!["symbol".to_string(), "days".to_string()],
            ),
            (RESPOND_TO_USER.to_string(), vec!["message".to_string()]),
        ])
    }

    fn params(action: &Action) -> &serde_json::Map<String, serde_json::Value> {
        match &action.argument {
            Some(ActionArgument::Params(p)) => p,
            other => panic!("expected params, got {other:?}"),
        }
    }

    #[test]
    fn positional_and_keyword_coercion() {
        let raw = "Thought: check it\nAction:\nfoo(\"AAPL\", 42, rate=3.14)\nEnd Action";
        let parsed = parse(raw, &no_sigs()).unwrap();
        assert_eq!(parsed.thought_text(), "check it");
        assert_eq!(parsed.actions.len(), 1);
        let p = params(&parsed.actions[0]);
        assert_eq!(p["param_0"], json!("AAPL"));
        assert_eq!(p["param_1"], json!(42));
        assert!(p["param_1"].is_i64());
        assert_eq!(p["rate"], json!(3.14));
        assert!(p["rate"].is_f64());
    }

    #[test]
    fn signature_names_positionals() {
        let raw = "Action:\nget_stock_history(\"AAPL\", 30)\nEnd Action";
        let parsed = parse(raw, &sigs()).unwrap();
        let p = params(&parsed.actions[0]);
        assert_eq!(p["symbol"], "AAPL");
        assert_eq!(p["days"], 30);
    }

    #[test]
    fn quoted_numbers_stay_strings() {
        let raw = "Action: foo('42', \"1.5\") End Action";
        let parsed = parse(raw, &no_sigs()).unwrap();
        let p = params(&parsed.actions[0]);
        assert_eq!(p["param_0"], json!("42"));
        assert_eq!(p["param_1"], json!("1.5"));
    }

    #[test]
    fn bare_words_that_are_not_numbers() {
        let raw = "Action: foo(AAPL, 1.2.3, -5, .) End Action";
        let parsed = parse(raw, &no_sigs()).unwrap();
        let p = params(&parsed.actions[0]);
        assert_eq!(p["param_0"], json!("AAPL"));
        assert_eq!(p["param_1"], json!("1.2.3"));
        assert_eq!(p["param_2"], json!("-5"));
        assert_eq!(p["param_3"], json!("."));
    }

    #[test]
    fn commas_inside_quotes_and_parens_do_not_split() {
        let raw = r#"Action:
respond_to_user("Apple, Inc. is at $100 (roughly)", note=max(1, 2))
End Action"#;
        let parsed = parse(raw, &sigs()).unwrap();
        let p = params(&parsed.actions[0]);
        assert_eq!(p["message"], "Apple, Inc. is at $100 (roughly)");
        assert_eq!(p["note"], "max(1, 2)");
    }

    #[test]
    fn escaped_quotes_in_literals() {
        let raw = r#"Action: respond_to_user("She said \"buy\"\nthen left") End Action"#;
        let parsed = parse(raw, &sigs()).unwrap();
        assert_eq!(
            parsed.terminal_message(Default::default()).unwrap(),
            "She said \"buy\"\nthen left"
        );
    }

    #[test]
    fn several_calls_in_one_block() {
        let raw = "Thought: two lookups\nAction:\nprice = get_stock_price(\"AAPL\")\nget_market_news()\nEnd Action";
        let parsed = parse(raw, &sigs()).unwrap();
        assert_eq!(parsed.actions.len(), 2);
        assert_eq!(parsed.actions[0].name, "get_stock_price");
        assert_eq!(params(&parsed.actions[0])["symbol"], "AAPL");
        assert_eq!(parsed.actions[1], Action::named("get_market_news"));
    }

    #[test]
    fn dotted_call_uses_last_segment() {
        let raw = "Action: tools.get_stock_price('MSFT') End Action";
        let parsed = parse(raw, &sigs()).unwrap();
        assert_eq!(parsed.actions[0].name, "get_stock_price");
        assert_eq!(params(&parsed.actions[0])["symbol"], "MSFT");
    }

    #[test]
    fn compound_expression_kept_as_text() {
        let raw = "Action: get_stock_history(\"AAPL\", days=7 * 2) End Action";
        let parsed = parse(raw, &sigs()).unwrap();
        assert_eq!(params(&parsed.actions[0])["days"], "7 * 2");
    }

    #[test]
    fn legacy_sentinel_name_is_canonical() {
        let raw = "Action: response_to_user(\"hello\") End Action";
        let parsed = parse(raw, &no_sigs()).unwrap();
        assert!(parsed.is_lone_sentinel());
        assert_eq!(parsed.terminal_message(Default::default()).unwrap(), "hello");
    }

    #[test]
    fn unbalanced_call_is_malformed() {
        for raw in [
            "Action: foo(\"AAPL\", 42 End Action",
            "Action: foo(bar(1) End Action",
        ] {
            let err = parse(raw, &no_sigs()).unwrap_err();
            assert!(
                matches!(err, GrammarParseError::MalformedPayload { .. }),
                "{raw}: {err:?}"
            );
        }
    }

    #[test]
    fn block_without_a_call_is_malformed() {
        let err = parse("Action: nothing to see End Action", &no_sigs()).unwrap_err();
        assert!(matches!(err, GrammarParseError::MalformedPayload { .. }));
    }

    #[test]
    fn unclosed_block_keeps_the_thought() {
        let parsed = parse("Thought: x\nAction: foo(1)", &no_sigs()).unwrap();
        assert!(parsed.actions.is_empty());
        assert_eq!(parsed.thought_text(), "x");

        let err = parse("Action: foo(1)", &no_sigs()).unwrap_err();
        assert!(matches!(err, GrammarParseError::MalformedPayload { .. }));
    }

    #[test]
    fn answer_is_a_terminal_thought() {
        let raw = "Thought: Based on the data, buy.\nAnswer: It is advisable to buy AAPL.";
        let parsed = parse(raw, &no_sigs()).unwrap();
        assert!(parsed.actions.is_empty());
        assert_eq!(parsed.thought_text(), "It is advisable to buy AAPL.");
    }

    #[test]
    fn bare_thought_is_the_reply() {
        let raw = "Thought: BTC has been flat all week, holding is reasonable.";
        let parsed = parse(raw, &sigs()).unwrap();
        assert!(parsed.actions.is_empty());
        assert_eq!(
            parsed.terminal_message(Default::default()).unwrap(),
            "BTC has been flat all week, holding is reasonable."
        );
    }

    #[test]
    fn plain_prose_is_no_delimiter() {
        let err = parse("hmm, nothing structured here", &no_sigs()).unwrap_err();
        assert_eq!(err, GrammarParseError::NoDelimiterFound { grammar: LABEL });
    }

    #[test]
    fn thought_runs_to_end_without_marker() {
        assert_eq!(extract_thought("Thought: dangling ").unwrap().as_str(), "dangling");
        assert_eq!(
            extract_thought("Thought:  a\nb \nAnswer: c").unwrap().as_str(),
            "a\nb"
        );
        assert!(extract_thought("no marker").is_none());
    }

    #[test]
    fn comment_lines_are_ignored() {
        let raw = "Thought: price first\nAction:\n# Let's check Apple\nget_stock_price(\"AAPL\")  # spot\nEnd Action";
        let parsed = parse(raw, &sigs()).unwrap();
        assert_eq!(parsed.actions.len(), 1);
        assert_eq!(parsed.actions[0].name, "get_stock_price");
        assert_eq!(params(&parsed.actions[0])["symbol"], "AAPL");
    }

    #[test]
    fn stray_apostrophe_in_prose_does_not_hide_call() {
        let raw = "Action:\nI'll look up the price: get_stock_price(\"AAPL\")\nEnd Action";
        let parsed = parse(raw, &sigs()).unwrap();
        assert_eq!(parsed.actions.len(), 1);
        assert_eq!(params(&parsed.actions[0])["symbol"], "AAPL");

        let raw = "Action:\nLet's see\nget_stock_price('MSFT')\nEnd Action";
        let parsed = parse(raw, &sigs()).unwrap();
        assert_eq!(params(&parsed.actions[0])["symbol"], "MSFT");
    }

    #[test]
    fn unclosed_quote_inside_call_is_read_as_text() {
        let parsed = parse("Action: foo(\"unterminated) End Action", &no_sigs()).unwrap();
        assert_eq!(params(&parsed.actions[0])["param_0"], json!("\"unterminated"));
    }

    #[test]
    fn tokenizer_spans() {
        let tokens = tokenize("f(a='x', 2)");
        let kinds: Vec<_> = tokens.iter().map(|s| s.token.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Word("f".into()),
                Token::LParen,
                Token::Word("a".into()),
                Token::Equals,
                Token::Str("x".into()),
                Token::Comma,
                Token::Word("2".into()),
                Token::RParen,
            ]
        );
        assert_eq!((tokens[4].start, tokens[4].end), (4, 7));
    }

    #[test]
    fn sentinel_reply_parses_back() {
        let reply = sentinel_reply("Line one\n\"quoted\" \\ done");
        let parsed = parse(&reply, &sigs()).unwrap();
        assert!(parsed.is_lone_sentinel());
        assert_eq!(
            parsed.terminal_message(Default::default()).unwrap(),
            "Line one\n\"quoted\" \\ done"
        );
    }
}
