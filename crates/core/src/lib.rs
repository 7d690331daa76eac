pub mod analysis;
pub mod cache;
pub mod domain;
pub mod ingest;
pub mod llm;
pub mod service;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    pub const DEFAULT_DASHBOARD_URL: &str = "https://www.chittorgarh.com/ipo/ipo_dashboard.asp";
    const DEFAULT_SNAPSHOT_TTL_SECS: u64 = 3600;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub google_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub dashboard_url: String,
        pub snapshot_ttl: Duration,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let snapshot_ttl_secs = std::env::var("SNAPSHOT_TTL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(DEFAULT_SNAPSHOT_TTL_SECS);

            Ok(Self {
                google_api_key: std::env::var("GOOGLE_API_KEY")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                dashboard_url: std::env::var("IPO_DASHBOARD_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_DASHBOARD_URL.to_string()),
                snapshot_ttl: Duration::from_secs(snapshot_ttl_secs),
            })
        }

        pub fn require_google_api_key(&self) -> anyhow::Result<&str> {
            self.google_api_key
                .as_deref()
                .context("GOOGLE_API_KEY is required")
        }
    }
}
