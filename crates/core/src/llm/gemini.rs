use crate::config::Settings;
use crate::llm::{LlmClient, LlmError, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TEMPERATURE: f32 = 0.4;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    timeout: Duration,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_google_api_key()?.to_string();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let temperature = std::env::var("GEMINI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);
        let max_output_tokens = std::env::var("GEMINI_MAX_OUTPUT_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);

        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let timeout = Duration::from_secs(timeout_secs);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            temperature,
            max_output_tokens,
            timeout,
        })
    }

    fn service_error(stage: &'static str, detail: String, raw_output: Option<String>) -> LlmError {
        LlmError::Service {
            provider: Provider::Gemini,
            stage,
            detail,
            raw_output,
        }
    }

    fn transport_error(&self, stage: &'static str, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else {
            Self::service_error(stage, err.to_string(), None)
        }
    }

    async fn generate_content(
        &self,
        req: GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Self::service_error("auth", e.to_string(), None))?,
        );

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.transport_error("send", e))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| self.transport_error("read_body", e))?;
        if !status.is_success() {
            return Err(Self::service_error(
                "http",
                format!("status={status}"),
                Some(text),
            ));
        }

        match serde_json::from_str::<GenerateContentResponse>(&text) {
            Ok(parsed) => Ok(parsed),
            Err(err) => Err(Self::service_error("decode", err.to_string(), Some(text))),
        }
    }

    fn response_text(res: &GenerateContentResponse) -> Result<String, LlmError> {
        let Some(candidate) = res.candidates.first() else {
            if let Some(reason) = res
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.as_deref())
            {
                tracing::warn!(block_reason = reason, "Gemini blocked the prompt");
            }
            return Err(LlmError::EmptyResponse);
        };

        let mut out = String::new();
        for part in candidate.content.iter().flat_map(|c| &c.parts) {
            if let Some(text) = part.text.as_deref() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }

        let out = out.trim().to_string();
        if out.is_empty() {
            tracing::warn!(
                finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
                "Gemini candidate carried no text"
            );
            return Err(LlmError::EmptyResponse);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let req = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let res = self.generate_content(req).await?;
        let finish_reason = res.candidates.first().and_then(|c| c.finish_reason.as_deref());
        if finish_reason == Some("MAX_TOKENS") {
            tracing::warn!(
                model = %self.model,
                max_output_tokens = self.max_output_tokens,
                "Gemini stopped at max output tokens; analysis may be truncated"
            );
        }
        Self::response_text(&res)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,

    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,

    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
