//! Tool trait and registry: the abstraction over agent capabilities.
//!
//! Tools are what give the assistant access to the world: price lookups,
//! news feeds, and the `respond_to_user` sentinel. The registry resolves an
//! [`Action`] to a handler by name and always hands back a [`ToolResult`],
//! whatever the handler did.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::action::{Action, ActionArgument};
use crate::error::ToolError;

/// A tool definition rendered into the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// Ordered parameter names
    pub signature: Vec<String>,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The outcome of one dispatched action.
///
/// Created by the registry, consumed by the loop when it builds the next
/// prompt, never kept past the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The action this result answers
    pub action_name: String,

    /// Structured output (empty on failure)
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,

    /// Failure description, tagged with the tool name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(action_name: impl Into<String>, output: serde_json::Value) -> Self {
        let payload = match output {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("result".into(), other);
                map
            }
        };
        Self {
            action_name: action_name.into(),
            payload,
            error: None,
        }
    }

    pub fn failure(action_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
            payload: serde_json::Map::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Compact rendering used in the aggregated observation message.
    pub fn render(&self) -> String {
        match &self.error {
            Some(error) => serde_json::json!({ "error": error }).to_string(),
            None => serde_json::Value::Object(self.payload.clone()).to_string(),
        }
    }
}

/// The core Tool trait.
///
/// Each capability (coin prices, news, the sentinel) implements this trait
/// and is registered in the [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_coin_price").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Ordered parameter names.
    ///
    /// The first entry is the conventional key a bare string argument is
    /// stored under, and the CodeCall grammar names positional arguments
    /// from this list.
    fn signature(&self) -> &[&str] {
        &[]
    }

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with a JSON object of arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for the system prompt.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            signature: self.signature().iter().map(|s| s.to_string()).collect(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Key used for a bare argument when a tool declares no signature.
const FALLBACK_ARGUMENT_KEY: &str = "argument";

/// Shape an action argument into the JSON object a handler receives.
///
/// A bare string lands under the tool's first signature entry, e.g. a bare
/// `"BTC"` for `get_coin_price` becomes `{"symbol": "BTC"}`.
pub fn coerce_arguments(tool: &dyn Tool, argument: Option<&ActionArgument>) -> serde_json::Value {
    match argument {
        None => serde_json::Value::Object(serde_json::Map::new()),
        Some(ActionArgument::Params(params)) => serde_json::Value::Object(params.clone()),
        Some(ActionArgument::Text(text)) => {
            let key = tool
                .signature()
                .first()
                .copied()
                .unwrap_or(FALLBACK_ARGUMENT_KEY);
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), serde_json::Value::String(text.clone()));
            serde_json::Value::Object(map)
        }
    }
}

/// A registry of available tools.
///
/// Tools are keyed by their own [`Tool::name`], so a name can never alias
/// a different capability. The registry is read-only once built and is
/// shared between concurrent loops behind an `Arc`.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: None,
        }
    }

    /// Bound every dispatch by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::from(tool)).is_some() {
            debug!(tool = %name, "Replaced previously registered tool");
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions, sorted by name so prompts are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Declared parameter names per tool.
    pub fn signatures(&self) -> HashMap<String, Vec<String>> {
        self.tools
            .iter()
            .map(|(name, tool)| {
                let params = tool.signature().iter().map(|s| s.to_string()).collect();
                (name.clone(), params)
            })
            .collect()
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch one action. Never fails: unknown names, handler errors,
    /// panics and timeouts all come back as `ToolResult::error`.
    pub async fn dispatch(&self, action: &Action) -> ToolResult {
        let name = action.name.as_str();
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "Model requested an unregistered tool");
            return ToolResult::failure(name, ToolError::UnknownTool(name.to_string()).to_string());
        };

        let arguments = coerce_arguments(tool.as_ref(), action.argument.as_ref());
        let start = Instant::now();
        let call = AssertUnwindSafe(tool.execute(arguments)).catch_unwind();

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                })),
            },
            None => call.await,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(output)) => {
                debug!(tool = %name, duration_ms, "Tool executed");
                ToolResult::success(name, output)
            }
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, duration_ms, "Tool execution failed");
                ToolResult::failure(name, attribute(name, e))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(tool = %name, reason = %reason, "Tool panicked");
                ToolResult::failure(
                    name,
                    attribute(
                        name,
                        ToolError::ExecutionFailed {
                            tool_name: name.to_string(),
                            reason: format!("handler panicked: {reason}"),
                        },
                    ),
                )
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Make sure an error string names the tool that produced it.
fn attribute(tool_name: &str, err: ToolError) -> String {
    match err {
        ToolError::ExecutionFailed { .. } | ToolError::Timeout { .. } => err.to_string(),
        other => ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: other.to_string(),
        }
        .to_string(),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn signature(&self) -> &[&str] { &["text"] }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;
            Ok(serde_json::json!({ "echo": text }))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str { "explode" }
        fn description(&self) -> &str { "Always panics" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({}) }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            panic!("feed offline");
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str { "slow" }
        fn description(&self) -> &str { "Sleeps for a minute" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({}) }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(serde_json::json!({}))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(PanickingTool));
        registry
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = registry();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo", "explode"]);
    }

    #[test]
    fn reregistering_replaces() {
        let mut registry = registry();
        registry.register(Box::new(EchoTool));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn signatures_expose_parameter_order() {
        let sigs = registry().signatures();
        assert_eq!(sigs["echo"], vec!["text".to_string()]);
        assert!(sigs["explode"].is_empty());
    }

    #[tokio::test]
    async fn bare_argument_uses_conventional_key() {
        let result = registry().dispatch(&Action::with_text("echo", "BTC")).await;
        assert!(result.is_success());
        assert_eq!(result.payload["echo"], "BTC");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_not_raised() {
        let result = registry().dispatch(&Action::named("get_weather")).await;
        assert_eq!(result.action_name, "get_weather");
        assert_eq!(result.error.as_deref(), Some("unknown tool type: get_weather"));
    }

    #[tokio::test]
    async fn handler_error_is_tagged_with_tool_name() {
        let result = registry().dispatch(&Action::named("echo")).await;
        let error = result.error.unwrap();
        assert!(error.contains("echo"), "{error}");
        assert!(error.contains("Missing 'text'"), "{error}");
    }

    #[tokio::test]
    async fn handler_panic_is_caught() {
        let result = registry().dispatch(&Action::named("explode")).await;
        let error = result.error.unwrap();
        assert!(error.contains("explode"));
        assert!(error.contains("feed offline"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(250));
        registry.register(Box::new(SlowTool));
        let result = registry.dispatch(&Action::named("slow")).await;
        let error = result.error.unwrap();
        assert!(error.contains("timed out"), "{error}");
        assert!(error.contains("slow"));
    }

    #[tokio::test]
    async fn concurrent_dispatch_from_shared_registry() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = ["AAPL", "BTC", "ETH"]
            .into_iter()
            .map(|symbol| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.dispatch(&Action::with_text("echo", symbol)).await })
            })
            .collect();
        for (handle, symbol) in handles.into_iter().zip(["AAPL", "BTC", "ETH"]) {
            let result = handle.await.unwrap();
            assert_eq!(result.payload["echo"], symbol);
        }
    }

    #[test]
    fn render_prefers_error() {
        let ok = ToolResult::success("x", serde_json::json!(42));
        assert_eq!(ok.render(), r#"{"result":42}"#);
        let failed = ToolResult::failure("x", "boom");
        assert_eq!(failed.render(), r#"{"error":"boom"}"#);
    }
}
