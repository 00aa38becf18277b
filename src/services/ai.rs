use rand::{thread_rng, Rng};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::{debug, warn};

use std::{thread, time::Duration};

use crate::config::{Config, MAX_RETRIES};
use crate::error::ServiceError;
use crate::services::ai_types::{
    Content, GenerateRequest, GenerateResponse, GenerationConfig, InlineData, RemoteService,
    RequestPart,
};

const BASE_DELAY_MS: u64 = 800;
const MAX_DELAY_MS: u64 = 30_000;
const MAX_ERROR_SNIPPET: usize = 400;

fn backoff(attempt: usize) -> Duration {
    let jitter: u64 = thread_rng().gen_range(0..200);
    let factor = 2_u64.checked_pow(attempt as u32).unwrap_or(u64::MAX);
    let ms = BASE_DELAY_MS.saturating_mul(factor).min(MAX_DELAY_MS) + jitter;
    Duration::from_millis(ms)
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    edit_model: String,
    analyze_model: String,
    max_retries: usize,
}

impl GeminiClient {
    pub fn new(cfg: &Config) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            edit_model: cfg.edit_model.clone(),
            analyze_model: cfg.analyze_model.clone(),
            max_retries: cfg.max_retries.clamp(1, MAX_RETRIES),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }

    fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::MissingApiKey)?;
        let endpoint = self.endpoint(model);

        let mut last_err = ServiceError::Transport(String::new());

        for attempt in 0..self.max_retries {
            let retry_left = attempt + 1 < self.max_retries;

            let res = self
                .client
                .post(&endpoint)
                .header("x-goog-api-key", api_key)
                .json(request)
                .send();

            let resp = match res {
                Ok(r) => r,
                Err(err) => {
                    warn!(attempt, error = %err, "request to {model} failed");
                    last_err = ServiceError::Transport(err.to_string());
                    if retry_left {
                        thread::sleep(backoff(attempt));
                    }
                    continue;
                }
            };

            let status = resp.status();

            // read as text first so error bodies survive a JSON failure
            let text = match resp.text() {
                Ok(t) => t,
                Err(err) => {
                    last_err = ServiceError::Transport(err.to_string());
                    if retry_left {
                        thread::sleep(backoff(attempt));
                    }
                    continue;
                }
            };

            if !status.is_success() {
                last_err = ServiceError::Http {
                    status: status.as_u16(),
                    message: extract_error_message(&text),
                };
                if should_retry_http(status) && retry_left {
                    warn!(attempt, status = status.as_u16(), "retrying {model}");
                    thread::sleep(backoff(attempt));
                    continue;
                }
                break;
            }

            match serde_json::from_str::<GenerateResponse>(&text) {
                Ok(parsed) => {
                    debug!(attempt, model, "generateContent ok");
                    return Ok(parsed);
                }
                Err(e) => {
                    last_err = ServiceError::InvalidResponse(e.to_string());
                    if retry_left {
                        thread::sleep(backoff(attempt));
                    }
                }
            }
        }

        Err(last_err)
    }
}

fn image_request<'a>(image_b64: &'a str, mime_type: &'a str, prompt: &'a str) -> Vec<Content<'a>> {
    vec![Content {
        parts: vec![
            RequestPart::Inline {
                inline_data: InlineData {
                    mime_type,
                    data: image_b64,
                },
            },
            RequestPart::Text { text: prompt },
        ],
    }]
}

impl RemoteService for GeminiClient {
    fn edit(&self, image_b64: &str, mime_type: &str, prompt: &str) -> Result<String, ServiceError> {
        let request = GenerateRequest {
            contents: image_request(image_b64, mime_type, prompt),
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["IMAGE", "TEXT"],
            }),
        };

        let response = self.generate(&self.edit_model, &request)?;

        match response.first_image() {
            Some(data) => Ok(data.to_string()),
            None => Err(ServiceError::NoImage(response.text())),
        }
    }

    fn analyze(&self, image_b64: &str, mime_type: &str, prompt: &str) -> Result<String, ServiceError> {
        let request = GenerateRequest {
            contents: image_request(image_b64, mime_type, prompt),
            generation_config: None,
        };

        let response = self.generate(&self.analyze_model, &request)?;

        response
            .text()
            .ok_or_else(|| ServiceError::InvalidResponse("missing text in candidates[0]".into()))
    }
}

fn should_retry_http(status: StatusCode) -> bool {
    // 408/429/5xx are usually transient
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn extract_error_message(body_text: &str) -> String {
    // { "error": { "message": "..." } } or { "message": "..." }
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body_text) {
        if let Some(msg) = v
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
        if let Some(msg) = v.get("message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }

    let trimmed = body_text.trim();
    if trimmed.chars().count() > MAX_ERROR_SNIPPET {
        let cut: String = trimmed.chars().take(MAX_ERROR_SNIPPET).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}
