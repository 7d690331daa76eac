use crate::analysis::prompt::build_prompt;
use crate::analysis::{AnalysisEngine, AnalysisError};
use crate::domain::{AnalysisReport, ListingRecord};
use crate::ingest::detail::parse_detail_text;
use crate::ingest::page::PageSource;
use crate::llm::sections::split_sections;
use crate::llm::LlmClient;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct IpoAnalyst {
    llm: Arc<dyn LlmClient>,
    pages: Option<Arc<dyn PageSource>>,
    timeout: Duration,
}

impl IpoAnalyst {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            llm,
            pages: None,
            timeout,
        }
    }

    pub fn from_env(llm: Arc<dyn LlmClient>) -> Self {
        let timeout_secs = std::env::var("ANALYSIS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(llm, Duration::from_secs(timeout_secs))
    }

    /// Enriches prompts with the listing's detail page when it has one.
    pub fn with_detail_pages(mut self, pages: Arc<dyn PageSource>) -> Self {
        self.pages = Some(pages);
        self
    }

    async fn detail_text(&self, record: &ListingRecord) -> Option<String> {
        let pages = self.pages.as_ref()?;
        if record.url.is_empty() {
            return None;
        }

        match pages.get_html(&record.url).await {
            Ok(html) => {
                let text = parse_detail_text(&html);
                if text.is_none() {
                    tracing::warn!(
                        name = %record.name,
                        url = %record.url,
                        "detail page has no main content; using listing fields only"
                    );
                }
                text
            }
            Err(err) => {
                tracing::warn!(
                    name = %record.name,
                    url = %record.url,
                    error = %err,
                    "detail page fetch failed; using listing fields only"
                );
                None
            }
        }
    }

    async fn run(&self, record: &ListingRecord) -> Result<AnalysisReport, AnalysisError> {
        let details = self.detail_text(record).await;
        let prompt = build_prompt(record, details.as_deref());

        let started = tokio::time::Instant::now();
        let raw = self.llm.complete(&prompt).await?;
        let raw = raw.trim().to_string();
        if raw.is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }

        let sections = split_sections(&raw);
        if sections.is_empty() {
            tracing::warn!(name = %record.name, "analysis had no recognised headings");
        }
        tracing::info!(
            provider = ?self.llm.provider(),
            key = %record.key(),
            name = %record.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis generated"
        );

        Ok(AnalysisReport {
            id: uuid::Uuid::new_v4(),
            source_listing_key: record.key(),
            listing: record.clone(),
            sections,
            raw_analysis: raw,
            generated_at: chrono::Utc::now(),
        })
    }
}

#[async_trait::async_trait]
impl AnalysisEngine for IpoAnalyst {
    async fn analyze(&self, record: &ListingRecord) -> Result<AnalysisReport, AnalysisError> {
        tokio::time::timeout(self.timeout, self.run(record))
            .await
            .map_err(|_| AnalysisError::Timeout(self.timeout))?
    }
}
