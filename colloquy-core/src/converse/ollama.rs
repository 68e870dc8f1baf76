//! Ollama-style chat completion client.
//!
//! Wire contract: `POST {endpoint}/api/chat` with
//! `{model, messages: [{role, content}], stream: false,
//!   options: {temperature, num_predict, num_ctx}}`;
//! the reply text is `message.content`. Health checks GET the endpoint
//! root. The conversant worker blocks on these calls, so the client keeps
//! a warm connection pool and a hard 60 s request timeout.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatBackend, ChatOptions, ChatTurn};
use crate::error::{ColloquyError, Result};

/// Request timeout for completions.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Short timeout for the startup health ping.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle connections kept per host for reuse across turns.
const POOL_IDLE: usize = 10;

/// Blocking HTTP client for an Ollama-compatible endpoint.
pub struct OllamaClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    temperature: f32,
    num_predict: u32,
    num_ctx: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaClient {
    /// Build a client for `endpoint` (e.g. `http://127.0.0.1:11434`) and
    /// the given model id.
    pub fn new(endpoint: &str, model: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(POOL_IDLE)
            .build()
            .map_err(|e| ColloquyError::Chat(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChatBackend for OllamaClient {
    fn health_check(&self) -> Result<()> {
        let response = self
            .http
            .get(&self.endpoint)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .map_err(|e| ColloquyError::EndpointUnreachable(e.to_string()))?;
        if response.status().is_success() {
            debug!(endpoint = self.endpoint.as_str(), "conversation endpoint reachable");
            Ok(())
        } else {
            Err(ColloquyError::EndpointUnreachable(format!(
                "{} returned {}",
                self.endpoint,
                response.status()
            )))
        }
    }

    fn chat(&self, messages: &[ChatTurn], options: &ChatOptions) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: RequestOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
                num_ctx: options.context_window,
            },
        };

        let url = format!("{}/api/chat", self.endpoint);
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| ColloquyError::Chat(e.to_string()))?
            .error_for_status()
            .map_err(|e| ColloquyError::Chat(e.to_string()))?;

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| ColloquyError::Chat(format!("malformed completion response: {e}")))?;
        Ok(parsed.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converse::Role;

    #[test]
    fn request_serializes_the_wire_contract() {
        let messages = vec![
            ChatTurn::new(Role::System, "be brief"),
            ChatTurn::new(Role::User, "hi"),
        ];
        let request = ChatRequest {
            model: "llama3.2",
            messages: &messages,
            stream: false,
            options: RequestOptions {
                temperature: 0.7,
                num_predict: 150,
                num_ctx: 1024,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["options"]["num_predict"], 150);
        assert_eq!(json["options"]["num_ctx"], 1024);
    }

    #[test]
    fn response_parses_message_content() {
        let raw = r#"{"model":"llama3.2","message":{"role":"assistant","content":"It is three o'clock."},"done":true}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content, "It is three o'clock.");
    }

    #[test]
    fn endpoint_trailing_slash_is_normalized() {
        let client = OllamaClient::new("http://127.0.0.1:11434/", "llama3.2").unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:11434");
    }
}
