//! Pipeline-level configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ColloquyError;
use crate::vad::DetectorConfig;

/// How microphone capture is reconciled with self-playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptMode {
    /// Capture always runs; new speech drains playback and queued replies.
    /// Suited to headsets where mic and speaker are acoustically isolated.
    Always,
    /// Capture pauses during playback and resumes after a delay. Suited to
    /// open speakers, where playback would be captured as "user speech".
    Wait,
}

impl fmt::Display for InterruptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::Wait => write!(f, "wait"),
        }
    }
}

impl FromStr for InterruptMode {
    type Err = ColloquyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "wait" => Ok(Self::Wait),
            other => Err(ColloquyError::Config(format!(
                "unknown interrupt mode '{other}' (expected always or wait)"
            ))),
        }
    }
}

/// Configuration for [`crate::assistant::Assistant`].
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// System prompt pinned at history index 0.
    pub system_prompt: String,
    /// Conversation model randomness.
    pub temperature: f32,
    /// User/assistant turn pairs retained in history.
    pub max_history: usize,
    /// Transcription language; "auto" selects auto-detection.
    pub language: String,
    /// Optional gating phrase; transcripts without it are dropped.
    pub wake_word: Option<String>,
    /// Playback-versus-capture policy.
    pub interrupt_mode: InterruptMode,
    /// Wait mode: milliseconds between playback end and capture resume.
    pub post_playback_delay_ms: u64,
    /// Playback device period in milliseconds; 0 selects the default.
    pub audio_buffer_ms: u32,
    /// Voice index within the synthesizer's bank.
    pub speaker_id: u32,
    /// Speaking speed; > 1.0 is faster (inverse of the length scale).
    pub speed: f32,
    /// Voice-activity detector settings.
    pub detector: DetectorConfig,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful voice assistant. Keep your answers short and \
                            conversational; they will be spoken aloud."
                .into(),
            temperature: 0.7,
            max_history: 10,
            language: "auto".into(),
            wake_word: None,
            interrupt_mode: InterruptMode::Always,
            post_playback_delay_ms: 300,
            audio_buffer_ms: 0,
            speaker_id: 0,
            speed: 1.0,
            detector: DetectorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_mode_parses_both_policies() {
        assert_eq!("always".parse::<InterruptMode>().unwrap(), InterruptMode::Always);
        assert_eq!(" Wait ".parse::<InterruptMode>().unwrap(), InterruptMode::Wait);
        assert!("sometimes".parse::<InterruptMode>().is_err());
    }

    #[test]
    fn interrupt_mode_serde_round_trips() {
        let json = serde_json::to_string(&InterruptMode::Wait).unwrap();
        assert_eq!(json, "\"wait\"");
        let parsed: InterruptMode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, InterruptMode::Wait);
    }
}
