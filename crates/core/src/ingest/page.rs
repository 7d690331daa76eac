use crate::ingest::FetchError;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REQ_DELAY_MS: u64 = 2000;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Source of rendered HTML. A headless-browser renderer can implement this in place of
/// the plain HTTP client.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn get_html(&self, url: &str) -> Result<String, FetchError>;
}

/// Enforces a minimum gap between consecutive requests to the same host.
///
/// Each caller reserves its slot under the lock and sleeps after releasing it, so a
/// paced host never holds up requests to other hosts.
#[derive(Debug)]
pub struct RequestPacer {
    min_delay: Duration,
    next_slot: tokio::sync::Mutex<HashMap<String, Instant>>,
}

impl RequestPacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            next_slot: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn wait_turn(&self, host: &str) {
        let ready_at = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let ready_at = slots.get(host).map_or(now, |prev| (*prev + self.min_delay).max(now));
            slots.insert(host.to_string(), ready_at);
            ready_at
        };

        if ready_at > Instant::now() {
            tracing::debug!(
                host,
                delay_ms = ready_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                "pacing request"
            );
            tokio::time::sleep_until(ready_at).await;
        }
    }
}

#[derive(Debug)]
pub struct HttpPageSource {
    http: reqwest::Client,
    timeout: Duration,
    pacer: RequestPacer,
}

impl HttpPageSource {
    pub fn from_env() -> anyhow::Result<Self> {
        let timeout_secs = std::env::var("SCRAPER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let req_delay_ms = std::env::var("SCRAPER_REQ_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQ_DELAY_MS);

        let user_agent = std::env::var("SCRAPER_USER_AGENT")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent).context("SCRAPER_USER_AGENT is not a valid header")?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );

        let timeout = Duration::from_secs(timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build scraper http client")?;

        Ok(Self {
            http,
            timeout,
            pacer: RequestPacer::new(Duration::from_millis(req_delay_ms)),
        })
    }
}

#[async_trait::async_trait]
impl PageSource for HttpPageSource {
    async fn get_html(&self, url: &str) -> Result<String, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| FetchError::Network(format!("invalid url {url}: {e}")))?;
        self.pacer.wait_turn(parsed.host_str().unwrap_or_default()).await;

        let res = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!("GET {url} returned HTTP {status}")));
        }

        res.text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))
    }
}
