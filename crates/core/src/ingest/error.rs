use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("listing source unreachable: {0}")]
    Network(String),

    #[error("unexpected listing page structure: {0}")]
    ParseFailure(String),

    #[error("listing source did not respond within {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Network(err.to_string())
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}
