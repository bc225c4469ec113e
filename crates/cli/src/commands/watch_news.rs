//! `ivan watch-news`: re-analyse the market whenever the news changes.
//!
//! Polls `get_news` on an interval. When the digest differs from the last
//! one seen, the agent is asked what changed and what to buy, hold or
//! avoid, and its answer is printed.

use std::path::Path;
use std::time::Duration;

use ivan_agent::AgentLoop;
use ivan_core::action::RESPOND_TO_USER;
use ivan_core::context::ConversationContext;
use ivan_core::tool::Tool;
use ivan_tools::{NewsFeed, NewsTool};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

const WATCH_USER: &str = "news-watch";

pub struct WatchOptions {
    pub interval: Duration,
    pub once: bool,
}

/// Remembers the last digest and turns a change into a prompt.
#[derive(Debug, Default)]
pub struct NewsWatcher {
    last: Option<serde_json::Value>,
}

impl NewsWatcher {
    /// Record `current`. Returns the analysis prompt when it differs from
    /// the previous digest (the first digest always counts as a change).
    pub fn observe(&mut self, current: serde_json::Value) -> Option<String> {
        if self.last.as_ref() == Some(&current) {
            return None;
        }
        let prompt = change_prompt(self.last.as_ref(), &current);
        self.last = Some(current);
        Some(prompt)
    }
}

fn change_prompt(previous: Option<&serde_json::Value>, current: &serde_json::Value) -> String {
    let previous = previous.map_or_else(|| "none, this is the first check".to_string(), |v| v.to_string());
    format!(
        "Please analyze what's different from the last news state: '{previous}' in comparison \
to the current news: '{current}'. Analyze the impact the last state had on the market and how \
it changed with the latest news. What might I invest in, what should I hold and what should I \
avoid? Reply only with a {RESPOND_TO_USER} action whose message holds the results of your analysis."
    )
}

/// Fetch the news once and, if it changed, return the agent's analysis.
async fn check(
    agent: &AgentLoop,
    news: &NewsTool,
    watcher: &mut NewsWatcher,
    deadline: Option<Duration>,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let digest = news.execute(serde_json::json!({})).await?;
    debug!(tool = news.name(), "Fetched news");

    let Some(prompt) = watcher.observe(digest) else {
        debug!("News unchanged");
        return Ok(None);
    };

    info!("News changed, requesting analysis");
    let context = ConversationContext::new(prompt, WATCH_USER);
    let reply = super::ask::answer(agent, context, deadline).await?;
    Ok(Some(reply.message))
}

pub async fn run(
    config_path: Option<&Path>,
    options: WatchOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    if options.interval.is_zero() {
        return Err("--interval-secs must be at least 1".into());
    }
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let agent = super::ask::build_agent(&config)?;
    let deadline = config.agent.deadline();

    let news = NewsTool::new(NewsFeed::General);
    let mut watcher = NewsWatcher::default();
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = options.interval.as_secs(), "Watching news");
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        match check(&agent, &news, &mut watcher, deadline).await {
            Ok(Some(analysis)) => println!("{analysis}\n"),
            Ok(None) => {}
            Err(e) if options.once => return Err(e),
            Err(e) => error!(error = %e, "News check failed"),
        }

        if options.once {
            break;
        }
    }
    Ok(())
}
