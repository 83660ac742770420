//! Language-model client.
//!
//! A thin request/response facade over the Gemini generateContent API.
//! Three attempts per request: exponential backoff on rate-limit and
//! server errors, a short fixed delay on transport errors, and no retry
//! on client errors.

use crate::errors::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;
const TRANSIENT_DELAY_MS: u64 = 250;

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a prompt, return the model's text.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    /// Build a client from `GEMINI_API_KEY`, or report the key as missing.
    pub fn from_env(model: &str) -> Result<Self, ModelError> {
        let api_key = std::env::var(API_KEY_VAR).map_err(|_| ModelError::MissingApiKey)?;
        if api_key.trim().is_empty() {
            return Err(ModelError::MissingApiKey);
        }
        Ok(Self::new(api_key, model.to_string()))
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", API_BASE, self.model)
    }

    async fn request_once(&self, prompt: &str) -> Result<String, ModelError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::RequestFailed {
                attempts: 1,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::BadStatus {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: GenerateResponse =
            response.json().await.map_err(|e| ModelError::RequestFailed {
                attempts: 1,
                message: format!("unparseable response: {}", e),
            })?;

        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        body.to_string()
    } else {
        format!("{}…", &body[..MAX])
    }
}

/// Whether a failed request is worth retrying.
fn retry_delay(error: &ModelError, attempt: u32) -> Option<Duration> {
    match error {
        // Rate limits and server errors back off exponentially
        ModelError::BadStatus { status, .. } if *status == 429 || *status >= 500 => Some(
            Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow(attempt - 1)),
        ),
        // Transport hiccups get a short fixed delay
        ModelError::RequestFailed { .. } => Some(Duration::from_millis(TRANSIENT_DELAY_MS)),
        // Client errors and empty responses will not improve on retry
        _ => None,
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.request_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => match retry_delay(&e, attempt) {
                    Some(delay) if attempt < MAX_ATTEMPTS => {
                        tracing::debug!(attempt, error = %e, "model request failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    Some(_) => {
                        return Err(ModelError::RequestFailed {
                            attempts: MAX_ATTEMPTS,
                            message: e.to_string(),
                        });
                    }
                    // Not worth retrying; surface the error as-is
                    None => return Err(e),
                },
            }
        }
        unreachable!("retry loop always returns")
    }
}
