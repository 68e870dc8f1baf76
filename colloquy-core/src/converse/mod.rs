//! Conversation management.
//!
//! The [`Conversant`] owns a bounded history with a pinned system prompt at
//! index 0 and produces one reply per user utterance. History is
//! single-owner (the conversant worker); no shared-write discipline needed.
//!
//! Remote failures surface to the user audibly: the canned [`APOLOGY`] is
//! returned in place of a reply and the failing assistant turn is never
//! written to history.

pub mod ollama;

pub use ollama::OllamaClient;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Reply text used when the conversation model fails.
pub const APOLOGY: &str = "I'm sorry, I encountered an error.";

/// Message author on the chat wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the conversation, as sent on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Sampling options for a completion request.
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub temperature: f32,
    /// Token cap per reply; spoken answers stay short.
    pub max_tokens: u32,
    /// Context window requested from the model.
    pub context_window: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 150,
            context_window: 1024,
        }
    }
}

/// Contract for conversation-model backends.
pub trait ChatBackend: Send + 'static {
    /// Verify the endpoint is reachable. Called once at startup.
    fn health_check(&self) -> Result<()>;

    /// Request a non-streaming completion for the ordered message list.
    fn chat(&self, messages: &[ChatTurn], options: &ChatOptions) -> Result<String>;
}

/// Bounded conversation state plus the model client.
pub struct Conversant {
    backend: Box<dyn ChatBackend>,
    history: Vec<ChatTurn>,
    max_history: usize,
    options: ChatOptions,
}

impl Conversant {
    /// Seed the history with one system turn.
    pub fn new(
        backend: Box<dyn ChatBackend>,
        system_prompt: impl Into<String>,
        max_history: usize,
        options: ChatOptions,
    ) -> Self {
        Self {
            backend,
            history: vec![ChatTurn::new(Role::System, system_prompt)],
            max_history,
            options,
        }
    }

    /// Produce a reply for `user_text`.
    ///
    /// On success the user and assistant turns are appended and history is
    /// truncated to `1 + 2·max_history` turns, preserving index 0. On
    /// failure the apology is returned; the user turn remains, the failed
    /// assistant turn is not recorded.
    pub fn chat(&mut self, user_text: &str) -> String {
        self.history.push(ChatTurn::new(Role::User, user_text));

        match self.backend.chat(&self.history, &self.options) {
            Ok(reply) => {
                self.history.push(ChatTurn::new(Role::Assistant, reply.clone()));
                self.truncate();
                debug!(turns = self.history.len(), "conversation advanced");
                reply
            }
            Err(e) => {
                warn!(error = %e, "conversation model failed; replying with apology");
                APOLOGY.to_string()
            }
        }
    }

    /// Drop everything but the system turn.
    pub fn clear_history(&mut self) {
        self.history.truncate(1);
    }

    /// Verify the model endpoint is reachable.
    pub fn health_check(&self) -> Result<()> {
        self.backend.health_check()
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Evict the oldest turn pairs, never index 0.
    fn truncate(&mut self) {
        let cap = 1 + 2 * self.max_history;
        while self.history.len() > cap && self.history.len() >= 3 {
            self.history.drain(1..3);
        }
    }
}
