//! The `respond_to_user` sentinel tool.
//!
//! A reply whose only action is `respond_to_user` ends the run without
//! touching the registry. The tool is still registered so it appears in
//! prompts and so a sentinel that shares a reply with other actions is
//! dispatched like any other tool.

use async_trait::async_trait;
use ivan_core::action::RESPOND_TO_USER;
use ivan_core::error::ToolError;
use ivan_core::tool::Tool;

pub struct RespondToUserTool;

#[async_trait]
impl Tool for RespondToUserTool {
    fn name(&self) -> &str {
        RESPOND_TO_USER
    }

    fn description(&self) -> &str {
        "Finalizes your response by providing information directly to the user based on the collected data. Accepts one argument, which will be shown to the user. Only use plaintext."
    }

    fn signature(&self) -> &[&str] {
        &["message"]
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message shown to the user"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let message = match &arguments["message"] {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        Ok(serde_json::json!({ "message": message }))
    }
}
