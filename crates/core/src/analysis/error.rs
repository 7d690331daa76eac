use crate::llm::LlmError;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("analysis did not complete within {0:?}")]
    Timeout(Duration),

    #[error("analysis service returned an empty response")]
    EmptyResponse,
}

impl AnalysisError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AnalysisError::Timeout(_))
    }
}

impl From<LlmError> for AnalysisError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(after) => AnalysisError::Timeout(after),
            LlmError::EmptyResponse => AnalysisError::EmptyResponse,
            service @ LlmError::Service { .. } => {
                AnalysisError::ServiceUnavailable(service.to_string())
            }
        }
    }
}
