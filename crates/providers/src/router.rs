//! Backend selection from configuration.

use std::sync::Arc;
use std::time::Duration;

use ivan_config::{AppConfig, BackendKind};
use ivan_core::backend::ModelBackend;
use ivan_core::error::BackendError;
use tracing::info;

use crate::canned::CannedBackend;
use crate::openai_compat::OpenAiCompatBackend;

/// Build the configured backend.
///
/// `canned_default` supplies the canned reply when `backend.canned_reply`
/// is unset, so callers can hand in a reply written in the active grammar.
pub fn build_from_config(
    config: &AppConfig,
    canned_default: impl FnOnce() -> String,
) -> Result<Arc<dyn ModelBackend>, BackendError> {
    let backend = &config.backend;
    let built: Arc<dyn ModelBackend> = match backend.kind {
        BackendKind::OpenaiCompat => Arc::new(OpenAiCompatBackend::new(
            backend_name(&backend.base_url),
            &backend.base_url,
            backend.api_key.clone(),
            Duration::from_secs(backend.timeout_secs),
        )?),
        BackendKind::Canned => Arc::new(CannedBackend::new(
            backend.canned_reply.clone().unwrap_or_else(canned_default),
        )),
    };

    info!(backend = built.name(), model = %backend.model, "Model backend ready");
    Ok(built)
}

/// Guess a readable backend name from well-known base URLs.
fn backend_name(base_url: &str) -> &'static str {
    if base_url.contains(":1234") {
        "lmstudio"
    } else if base_url.contains(":11434") {
        "ollama"
    } else if base_url.contains("api.openai.com") {
        "openai"
    } else if base_url.contains(":8000") {
        "vllm"
    } else {
        "openai_compat"
    }
}
