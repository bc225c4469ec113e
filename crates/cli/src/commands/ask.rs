//! `ivan ask`: single-message or interactive chat.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ivan_agent::{AgentLoop, AgentReply, LoopResponse, ResponseGrammar, RunControl};
use ivan_config::{AppConfig, BackendKind, GrammarKind};
use ivan_core::context::ConversationContext;
use ivan_core::error::Result as RunResult;
use ivan_core::message::{ConversationId, Message};
use ivan_providers::canned::DEFAULT_CANNED_REPLY;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What the canned backend says when no reply is configured.
const CANNED_ANSWER: &str = "You should consider investing in stocks! The market is full of \
opportunities right now. Have you looked into tech stocks? They're particularly interesting at the moment.";

const CLI_USER: &str = "cli";

pub struct AskOptions {
    pub message: Option<String>,
    pub grammar: Option<GrammarKind>,
    pub max_cycles: Option<u32>,
    pub backend: Option<BackendKind>,
    pub json: bool,
}

impl AskOptions {
    fn apply(&self, config: &mut AppConfig) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(grammar) = self.grammar {
            config.agent.grammar = grammar;
        }
        if let Some(max_cycles) = self.max_cycles {
            if max_cycles == 0 {
                return Err("--max-cycles must be at least 1".into());
            }
            config.agent.max_cycles = max_cycles;
        }
        if let Some(backend) = self.backend {
            config.backend.kind = backend;
        }
        Ok(())
    }
}

/// Wire config, backend, tools and grammar into a ready loop.
pub fn build_agent(config: &AppConfig) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let tools = Arc::new(
        ivan_tools::registry_with_currency(&config.tools.default_currency)
            .with_timeout(config.tools.timeout()),
    );
    let grammar = ResponseGrammar::for_kind(config.agent.grammar, &tools);
    let backend = ivan_providers::build_from_config(config, || canned_reply(&grammar))?;
    Ok(AgentLoop::from_config(config, backend, tools))
}

fn canned_reply(grammar: &ResponseGrammar) -> String {
    match grammar {
        ResponseGrammar::CodeCall { .. } => DEFAULT_CANNED_REPLY.to_string(),
        other => other.sentinel_reply(CANNED_ANSWER),
    }
}

pub async fn run(
    config_path: Option<&Path>,
    options: AskOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    options.apply(&mut config)?;

    let agent = build_agent(&config)?;
    let deadline = config.agent.deadline();

    match &options.message {
        Some(message) => {
            let context = ConversationContext::new(message, CLI_USER);
            let result = answer(&agent, context, deadline).await;
            if options.json {
                println!("{}", serde_json::to_string(&LoopResponse::from(result))?);
            } else {
                println!("{}", result?.message);
            }
        }
        None => interactive(&agent, &config, deadline).await?,
    }

    Ok(())
}

async fn interactive(
    agent: &AgentLoop,
    config: &AppConfig,
    deadline: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  IVAN: Interactive Venture Analysis Network");
    println!();
    println!("  Backend:   {:?}", config.backend.kind);
    println!("  Model:     {}", config.backend.model);
    println!("  Grammar:   {}", agent.grammar().name());
    println!("  Max cycles: {}", config.agent.max_cycles);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C cancels a running answer; type 'exit' to quit.");
    println!();

    let session_id = ConversationId::new();
    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        let context = ConversationContext::new(input, CLI_USER)
            .with_session(session_id.clone())
            .with_history(history.clone());

        match answer(agent, context, deadline).await {
            Ok(reply) => {
                println!();
                for line in reply.message.lines() {
                    println!("  IVAN > {line}");
                }
                println!();
                history.push(Message::user(input));
                history.push(Message::assistant(reply.message));
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one message, cancelling on Ctrl+C.
pub(super) async fn answer(
    agent: &AgentLoop,
    context: ConversationContext,
    deadline: Option<Duration>,
) -> RunResult<AgentReply> {
    let token = CancellationToken::new();
    let mut control = RunControl::new().with_cancel(token.clone());
    if let Some(limit) = deadline {
        control = control.with_timeout(limit);
    }

    let watcher = tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });

    let result = agent.run_with(context, &control).await;
    watcher.abort();

    if let Ok(reply) = &result {
        debug!(cycles = reply.cycles, tool_calls = reply.tool_calls_made, "Answered");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canned_config(grammar: GrammarKind) -> AppConfig {
        let mut config = AppConfig::default();
        config.backend.kind = BackendKind::Canned;
        config.agent.grammar = grammar;
        config
    }

    #[tokio::test]
    async fn canned_backend_answers_in_every_grammar() {
        for grammar in [GrammarKind::Json, GrammarKind::Xml, GrammarKind::CodeCall] {
            let agent = build_agent(&canned_config(grammar)).unwrap();
            let reply = answer(&agent, ConversationContext::new("hi", CLI_USER), None)
                .await
                .unwrap();
            assert!(reply.message.starts_with("You should consider investing"), "{grammar}");
            assert_eq!(reply.cycles, 1);
        }
    }

    #[test]
    fn options_override_config() {
        let mut config = AppConfig::default();
        let options = AskOptions {
            message: None,
            grammar: Some(GrammarKind::Xml),
            max_cycles: Some(3),
            backend: Some(BackendKind::Canned),
            json: false,
        };
        options.apply(&mut config).unwrap();
        assert_eq!(config.agent.grammar, GrammarKind::Xml);
        assert_eq!(config.agent.max_cycles, 3);
        assert_eq!(config.backend.kind, BackendKind::Canned);
    }

    #[test]
    fn zero_max_cycles_is_rejected() {
        let options = AskOptions {
            message: None,
            grammar: None,
            max_cycles: Some(0),
            backend: None,
            json: false,
        };
        assert!(options.apply(&mut AppConfig::default()).is_err());
    }
}
