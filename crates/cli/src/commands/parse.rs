//! `ivan parse`: run a saved model reply through a grammar.
//!
//! Prints the parsed response as JSON. When the reply cannot be read, the
//! failure class and the recovered apology are printed instead.

use std::path::Path;

use ivan_agent::ResponseGrammar;
use ivan_config::GrammarKind;
use ivan_core::action::ParsedResponse;
use tokio::io::AsyncReadExt;

pub async fn run(grammar: GrammarKind, file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let raw = match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let registry = ivan_tools::default_registry();
    let grammar = ResponseGrammar::for_kind(grammar, &registry);
    println!("{}", serde_json::to_string_pretty(&render(&grammar, &raw))?);
    Ok(())
}

fn render(grammar: &ResponseGrammar, raw: &str) -> serde_json::Value {
    match grammar.try_parse(raw) {
        Ok(parsed) => serde_json::json!({
            "grammar": grammar.name(),
            "parsed": parsed,
        }),
        Err(err) => serde_json::json!({
            "grammar": grammar.name(),
            "failure": err.to_string(),
            "recovered": ParsedResponse::from_parse_error(&err),
        }),
    }
}
