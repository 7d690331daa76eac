pub mod analysis;
pub mod snapshot;

pub use analysis::{AnalysisCache, AnalysisKey};
pub use snapshot::SnapshotCache;
