pub mod error;
pub mod gemini;
pub mod sections;

pub use error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
}

/// Prompt-in, free-text-out completion service.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}
