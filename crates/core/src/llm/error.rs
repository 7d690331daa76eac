use crate::llm::Provider;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM error (provider={provider:?}, stage={stage}): {detail}")]
    Service {
        provider: Provider,
        stage: &'static str,
        detail: String,
        raw_output: Option<String>,
    },

    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM returned no usable content")]
    EmptyResponse,
}
