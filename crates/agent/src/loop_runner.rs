//! The agent reasoning loop implementation.
//!
//! One inbound message drives a bounded state machine:
//!
//! ```text
//! AwaitingModel → Parsing → Terminated
//!                         ↘ Dispatching → Aggregating → AwaitingModel
//! ```
//!
//! Each model call is one cycle. A reply with no actions, or whose only
//! action is `respond_to_user`, ends the run. Anything else is dispatched
//! through the tool registry and the results are folded into the next
//! prompt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ivan_config::AppConfig;
use ivan_core::action::{ParsedResponse, SentinelFallback};
use ivan_core::backend::{CompletionRequest, ModelBackend};
use ivan_core::context::ConversationContext;
use ivan_core::error::{Error, Result};
use ivan_core::event::{DomainEvent, EventBus};
use ivan_core::message::{ConversationId, Message};
use ivan_core::tool::{ToolRegistry, ToolResult};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::grammar::ResponseGrammar;

const DEFAULT_MAX_CYCLES: u32 = 8;

/// Caller-side control over a run: cancellation and an optional deadline.
///
/// Both are checked at every suspension point, the backend call and each
/// tool dispatch.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe an externally owned cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Race `fut` against cancellation and the deadline.
    async fn guard<F: Future>(&self, stage: &'static str, fut: F) -> Result<F::Output> {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = deadline => Err(Error::DeadlineExceeded { stage }),
            out = fut => Ok(out),
        }
    }
}

/// A finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    /// The user-visible answer.
    pub message: String,
    pub session_id: ConversationId,
    /// Model calls made.
    pub cycles: u32,
    /// Tool dispatches made.
    pub tool_calls_made: usize,
    /// Every non-empty thought, in order.
    pub thoughts: Vec<String>,
}

/// The caller-facing shape of a run: `{"message": ...}` or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoopResponse {
    Message { message: String },
    Error { error: String },
}

impl From<Result<AgentReply>> for LoopResponse {
    fn from(result: Result<AgentReply>) -> Self {
        match result {
            Ok(reply) => LoopResponse::Message {
                message: reply.message,
            },
            Err(e) => LoopResponse::Error {
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    Parsing(String),
    Dispatching(ParsedResponse),
    Aggregating(Vec<ToolResult>),
    Terminated(String),
}

/// The core agent loop that orchestrates model calls and tool execution.
pub struct AgentLoop {
    /// The model backend to use
    backend: Arc<dyn ModelBackend>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// How replies are prompted for and parsed
    grammar: ResponseGrammar,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Maximum model calls per inbound message
    max_cycles: u32,

    /// Answer for an argument-less `respond_to_user`
    sentinel_fallback: SentinelFallback,

    /// Event bus for domain events
    event_bus: Option<Arc<EventBus>>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        grammar: ResponseGrammar,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            grammar,
            tools,
            max_cycles: DEFAULT_MAX_CYCLES,
            sentinel_fallback: SentinelFallback::default(),
            event_bus: None,
        }
    }

    /// Create a loop from the `[backend]` and `[agent]` sections.
    pub fn from_config(
        config: &AppConfig,
        backend: Arc<dyn ModelBackend>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let grammar = ResponseGrammar::for_kind(config.agent.grammar, &tools);
        let mut agent = Self::new(backend, &config.backend.model, tools, grammar)
            .with_temperature(config.backend.temperature)
            .with_max_cycles(config.agent.max_cycles)
            .with_sentinel_fallback(config.agent.sentinel_fallback);
        if let Some(max) = config.backend.max_tokens {
            agent = agent.with_max_tokens(max);
        }
        agent
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of model calls per run.
    pub fn with_max_cycles(mut self, max: u32) -> Self {
        self.max_cycles = max;
        self
    }

    pub fn with_sentinel_fallback(mut self, fallback: SentinelFallback) -> Self {
        self.sentinel_fallback = fallback;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn grammar(&self) -> &ResponseGrammar {
        &self.grammar
    }

    /// Run to completion with no deadline and no cancellation.
    pub async fn run(&self, context: ConversationContext) -> Result<AgentReply> {
        self.run_with(context, &RunControl::new()).await
    }

    /// Run to completion under `control`.
    pub async fn run_with(
        &self,
        context: ConversationContext,
        control: &RunControl,
    ) -> Result<AgentReply> {
        let session_id = context.session_id.clone();
        let result = self.drive(context, control).await;
        if let Err(e) = &result {
            warn!(session_id = %session_id, error = %e, "Agent run failed");
            self.publish(DomainEvent::ErrorOccurred {
                session_id: session_id.to_string(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        result
    }

    async fn drive(
        &self,
        mut ctx: ConversationContext,
        control: &RunControl,
    ) -> Result<AgentReply> {
        let original = ctx.content.clone();
        let system_prompt = self.grammar.system_prompt(&self.tools.definitions());
        let mut thoughts = Vec::new();
        let mut model_calls = 0u32;
        let mut tool_calls_made = 0usize;

        info!(
            session_id = %ctx.session_id,
            user_id = %ctx.user_id,
            grammar = self.grammar.name(),
            max_cycles = self.max_cycles,
            "Agent loop starting"
        );

        let mut state = LoopState::AwaitingModel;
        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if ctx.cycle_count >= self.max_cycles {
                        warn!(
                            session_id = %ctx.session_id,
                            cycles = ctx.cycle_count,
                            "Cycle limit reached without a final answer"
                        );
                        return Err(Error::CycleLimitExceeded {
                            max_cycles: self.max_cycles,
                        });
                    }

                    let request = CompletionRequest {
                        model: self.model.clone(),
                        messages: self.build_messages(&system_prompt, &ctx),
                        temperature: self.temperature,
                        max_tokens: self.max_tokens,
                    };

                    model_calls += 1;
                    debug!(session_id = %ctx.session_id, cycle = model_calls, "Calling model");
                    let response = control
                        .guard("awaiting the model", self.backend.complete(request))
                        .await??;

                    self.publish(DomainEvent::ModelReplied {
                        session_id: ctx.session_id.to_string(),
                        cycle: model_calls,
                        model: response.model.clone(),
                        tokens_used: response.usage.as_ref().map(|u| u.total_tokens),
                        timestamp: Utc::now(),
                    });
                    LoopState::Parsing(response.content)
                }

                LoopState::Parsing(raw) => {
                    let parsed = self.grammar.parse(&raw);
                    if let Some(thought) = &parsed.thought {
                        thoughts.push(thought.as_str().to_string());
                    }
                    debug!(
                        session_id = %ctx.session_id,
                        actions = parsed.actions.len(),
                        "Parsed model reply"
                    );
                    match parsed.terminal_message(self.sentinel_fallback) {
                        Some(message) => LoopState::Terminated(message),
                        None => LoopState::Dispatching(parsed),
                    }
                }

                LoopState::Dispatching(parsed) => {
                    let mut results = Vec::with_capacity(parsed.actions.len());
                    for action in &parsed.actions {
                        let start = Instant::now();
                        let result = control
                            .guard("dispatching tools", self.tools.dispatch(action))
                            .await?;
                        tool_calls_made += 1;

                        self.publish(DomainEvent::ToolExecuted {
                            session_id: ctx.session_id.to_string(),
                            tool_name: action.name.clone(),
                            success: result.is_success(),
                            duration_ms: start.elapsed().as_millis() as u64,
                            timestamp: Utc::now(),
                        });
                        results.push(result);
                    }
                    LoopState::Aggregating(results)
                }

                LoopState::Aggregating(results) => {
                    ctx.content = aggregate(&results, &original);
                    ctx.cycle_count += 1;
                    LoopState::AwaitingModel
                }

                LoopState::Terminated(message) => {
                    info!(
                        session_id = %ctx.session_id,
                        cycles = model_calls,
                        tool_calls = tool_calls_made,
                        "Agent loop completed"
                    );
                    self.publish(DomainEvent::LoopTerminated {
                        session_id: ctx.session_id.to_string(),
                        cycles: model_calls,
                        tool_calls_made,
                        timestamp: Utc::now(),
                    });
                    return Ok(AgentReply {
                        message,
                        session_id: ctx.session_id,
                        cycles: model_calls,
                        tool_calls_made,
                        thoughts,
                    });
                }
            };
        }
    }

    /// `[system prompt, history…, user(content)]`
    fn build_messages(&self, system_prompt: &str, ctx: &ConversationContext) -> Vec<Message> {
        let mut messages = Vec::with_capacity(ctx.history.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(ctx.history.iter().cloned());
        messages.push(Message::user(&ctx.content));
        messages
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// The follow-up prompt that hands tool results back to the model.
pub fn aggregate(results: &[ToolResult], original: &str) -> String {
    let lines = results
        .iter()
        .map(|r| format!("- For action '{}': {}", r.action_name, r.render()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "I've gathered the information you requested. Here are the results:\n\n{lines}\n\nGiven this information, please provide a response to the user's original message: '{original}'"
    )
}
