pub mod analyst;
pub mod error;
pub mod prompt;

pub use analyst::IpoAnalyst;
pub use error::AnalysisError;

use crate::domain::{AnalysisReport, ListingRecord};

/// Produces a sectioned report for one listing. Assumed expensive: callers cache.
#[async_trait::async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn analyze(&self, record: &ListingRecord) -> Result<AnalysisReport, AnalysisError>;
}
