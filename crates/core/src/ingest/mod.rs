pub mod dashboard;
pub mod detail;
pub mod error;
pub mod page;

pub use error::FetchError;

use crate::domain::Snapshot;

/// Pulls one unversioned snapshot of both listing categories.
///
/// Implementations do not retry; the caller owns retry policy.
#[async_trait::async_trait]
pub trait ListingFetcher: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Snapshot, FetchError>;
}
