use super::ReasoningError;
use crate::config::{Config, API_KEY_ENV};
use crate::util::truncate_str;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thin OpenAI-compatible chat client. One request per call, no retries: the
/// pipeline already tolerates a failed call and a retry would only stretch
/// the per-call time bound.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ChatClient {
    pub fn from_config(config: &Config) -> Result<Self, ReasoningError> {
        let timeout = config.request_timeout();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one system/user exchange in JSON mode and return the raw content.
    pub async fn complete_json(&self, system: &str, user: &str) -> Result<String, ReasoningError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ReasoningError::NotConfigured(API_KEY_ENV))?;

        let request = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            stream: false,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        if !status.is_success() {
            let message = match status.as_u16() {
                401 => "Invalid API key".to_string(),
                429 => "Rate limited by the reasoning service".to_string(),
                500..=599 => "Server error; the service may be temporarily unavailable".to_string(),
                _ => sanitize_api_response(&text),
            };
            return Err(ReasoningError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            ReasoningError::Malformed(format!(
                "unreadable completion envelope ({}): {}",
                e,
                sanitize_api_response(&text)
            ))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ReasoningError::Malformed("empty completion".to_string()))
    }

    fn classify_transport_error(&self, err: reqwest::Error) -> ReasoningError {
        if err.is_timeout() {
            ReasoningError::Timeout(self.timeout)
        } else {
            ReasoningError::Transport(err)
        }
    }
}

/// Keep error bodies short and single-line so they can be stored as an
/// issue placeholder or a project failure message.
fn sanitize_api_response(text: &str) -> String {
    let flattened: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let trimmed = flattened.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    truncate_str(trimmed, 200).to_string()
}
