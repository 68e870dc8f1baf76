//! Persistent application settings (JSON file in the platform config dir).

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use colloquy_core::config::{AssistantConfig, InterruptMode};
use colloquy_core::provider::Provider;
use colloquy_core::vad::DetectorConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Conversation model endpoint.
    pub chat_endpoint: String,
    /// Conversation model id.
    pub chat_model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_history: usize,
    /// Transcription language; "auto" selects auto-detection.
    pub language: String,
    pub wake_word: Option<String>,
    /// "always" or "wait".
    pub interrupt_mode: String,
    pub post_playback_delay_ms: u64,
    /// Playback device period in ms; 0 selects the default (100).
    pub audio_buffer_ms: u32,
    pub vad_threshold: f32,
    pub vad_silence_secs: f32,
    pub vad_min_speech_secs: f32,
    pub vad_max_speech_secs: f32,
    pub speaker_id: u32,
    pub speed: f32,
    /// Global hardware provider override ("cpu", "cuda", "coreml").
    pub provider: Option<String>,
    /// Per-subsystem overrides.
    pub recognizer_provider: Option<String>,
    pub synthesizer_provider: Option<String>,
    /// Worker threads for the model collaborators; 0 auto-selects.
    pub num_threads: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        let core = AssistantConfig::default();
        Self {
            chat_endpoint: "http://127.0.0.1:11434".into(),
            chat_model: "llama3.2".into(),
            system_prompt: core.system_prompt,
            temperature: core.temperature,
            max_history: core.max_history,
            language: core.language,
            wake_word: None,
            interrupt_mode: core.interrupt_mode.to_string(),
            post_playback_delay_ms: core.post_playback_delay_ms,
            audio_buffer_ms: core.audio_buffer_ms,
            vad_threshold: core.detector.threshold,
            vad_silence_secs: core.detector.min_silence_secs,
            vad_min_speech_secs: core.detector.min_speech_secs,
            vad_max_speech_secs: core.detector.max_speech_secs,
            speaker_id: core.speaker_id,
            speed: core.speed,
            provider: None,
            recognizer_provider: None,
            synthesizer_provider: None,
            num_threads: 0,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.chat_endpoint = self.chat_endpoint.trim().trim_end_matches('/').to_string();
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.max_history = self.max_history.max(1);
        self.vad_threshold = self.vad_threshold.clamp(0.0, 1.0);
        self.speed = if self.speed > 0.0 { self.speed } else { 1.0 };
        self.wake_word = self
            .wake_word
            .as_ref()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty());
        if self.interrupt_mode.parse::<InterruptMode>().is_err() {
            tracing::warn!(
                mode = self.interrupt_mode.as_str(),
                "unknown interrupt mode in settings; falling back to always"
            );
            self.interrupt_mode = InterruptMode::Always.to_string();
        }
    }

    /// Translate into the core pipeline configuration.
    pub fn assistant_config(&self) -> anyhow::Result<AssistantConfig> {
        let interrupt_mode = InterruptMode::from_str(&self.interrupt_mode)?;
        Ok(AssistantConfig {
            system_prompt: self.system_prompt.clone(),
            temperature: self.temperature,
            max_history: self.max_history,
            language: self.language.clone(),
            wake_word: self.wake_word.clone(),
            interrupt_mode,
            post_playback_delay_ms: self.post_playback_delay_ms,
            audio_buffer_ms: self.audio_buffer_ms,
            speaker_id: self.speaker_id,
            speed: self.speed,
            detector: DetectorConfig {
                threshold: self.vad_threshold,
                min_silence_secs: self.vad_silence_secs,
                min_speech_secs: self.vad_min_speech_secs,
                max_speech_secs: self.vad_max_speech_secs,
                ..DetectorConfig::default()
            },
        })
    }

    /// Resolve the provider override for a subsystem field.
    pub fn provider_override(raw: &Option<String>) -> anyhow::Result<Option<Provider>> {
        raw.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Provider>().map_err(Into::into))
            .transpose()
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Colloquy")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("colloquy")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_normalize_cleanly() {
        let mut settings = AppSettings::default();
        settings.normalize();
        assert_eq!(settings.interrupt_mode, "always");
        assert!(settings.assistant_config().is_ok());
    }

    #[test]
    fn bad_interrupt_mode_falls_back() {
        let mut settings = AppSettings {
            interrupt_mode: "sometimes".into(),
            ..AppSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.interrupt_mode, "always");
    }

    #[test]
    fn empty_wake_word_is_dropped() {
        let mut settings = AppSettings {
            wake_word: Some("   ".into()),
            ..AppSettings::default()
        };
        settings.normalize();
        assert!(settings.wake_word.is_none());
    }

    #[test]
    fn provider_override_parses() {
        assert_eq!(
            AppSettings::provider_override(&Some("cuda".into())).unwrap(),
            Some(Provider::Cuda)
        );
        assert_eq!(AppSettings::provider_override(&None).unwrap(), None);
        assert!(AppSettings::provider_override(&Some("npu".into())).is_err());
    }

    #[test]
    fn settings_survive_a_save_load_round_trip() {
        let dir = std::env::temp_dir().join("colloquy-settings-test");
        let path = dir.join("settings.json");
        let mut settings = AppSettings::default();
        settings.wake_word = Some("hey colloquy".into());
        settings.interrupt_mode = "wait".into();

        save_settings(&path, &settings).unwrap();
        let loaded = load_settings(&path);
        assert_eq!(loaded.wake_word.as_deref(), Some("hey colloquy"));
        assert_eq!(loaded.interrupt_mode, "wait");

        let _ = fs::remove_dir_all(&dir);
    }
}
