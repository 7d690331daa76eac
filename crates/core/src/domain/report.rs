use crate::domain::listing::{ListingKey, ListingRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The six fixed report sections. A section the model omitted is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSections {
    pub snapshot: String,
    pub business_overview: String,
    pub financial_health: String,
    pub positive_indicators: String,
    pub risk_factors: String,
    pub verdict: String,
}

impl ReportSections {
    /// Sections in presentation order, paired with their headings.
    pub fn titled(&self) -> [(&'static str, &str); 6] {
        [
            ("IPO Snapshot", self.snapshot.as_str()),
            ("Business Overview", self.business_overview.as_str()),
            ("Financial Health", self.financial_health.as_str()),
            ("Positive Indicators", self.positive_indicators.as_str()),
            ("Risk Factors", self.risk_factors.as_str()),
            ("Final Verdict", self.verdict.as_str()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.titled().iter().all(|(_, body)| body.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub source_listing_key: ListingKey,
    pub listing: ListingRecord,
    pub sections: ReportSections,
    pub raw_analysis: String,
    pub generated_at: DateTime<Utc>,
}
