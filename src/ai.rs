// src/ai.rs
//! Language-model client used for field classification and open-ended
//! answers. Callers must treat non-conforming output as a soft failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("completion API unavailable after {retries} retries")]
    Exhausted { retries: u32 },
}

/// Single text-completion seam. The navigator and analyzer only ever see
/// this trait, so the backing service is swappable.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, context: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct CompletionMessage {
    context: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    messages: Vec<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    message: String,
}

/// Bearer-token chat completion client.
pub struct CompletionClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl CompletionClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let api_key = env::var("ASSISTANT_API_KEY")
            .context("ASSISTANT_API_KEY environment variable not set")?;

        let base_url =
            env::var("ASSISTANT_API_URL").unwrap_or_else(|_| "https://api0.ai".to_string());

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    async fn send_completion(&self, context: &str, content: &str) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            messages: vec![CompletionMessage {
                context: context.to_string(),
                content: content.to_string(),
            }],
        };

        info!("Sending completion request: {}", context);

        let mut last_error: Option<CompletionError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Completion attempt {} failed, retrying after {}ms",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(format!("{}/chat", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(CompletionError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = Some(CompletionError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CompletionError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let completion: CompletionResponse = response.json().await?;
            debug!("Completion succeeded for: {}", context);
            return Ok(completion.message);
        }

        Err(last_error.unwrap_or(CompletionError::Exhausted {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl LanguageModel for CompletionClient {
    async fn complete(&self, context: &str, prompt: &str) -> Result<String> {
        self.send_completion(context, prompt)
            .await
            .context("Completion API call failed")
    }
}

/// Ask the model for JSON and parse it leniently. Returns `None` instead of
/// erroring when the reply does not conform; the caller skips, not crashes.
pub async fn complete_json<T: DeserializeOwned>(
    llm: &dyn LanguageModel,
    context: &str,
    prompt: &str,
) -> Option<T> {
    let reply = match llm.complete(context, prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Language model call failed ({}): {}", context, e);
            return None;
        }
    };

    let stripped = strip_json_fences(&reply);
    match serde_json::from_str(stripped) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Language model returned non-conforming JSON ({}): {}", context, e);
            None
        }
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n[1, 2]\n```";
        assert_eq!(strip_json_fences(input), "[1, 2]");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), input);
    }
}
