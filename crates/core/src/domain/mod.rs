pub mod listing;
pub mod report;

pub use listing::{Category, ListingKey, ListingRecord, ParseCategoryError, Snapshot};
pub use report::{AnalysisReport, ReportSections};
