//! Text-to-speech abstraction.
//!
//! The [`Synthesizer`] trait decouples the speaker from any specific voice
//! backend. Synthesis happens sentence-by-sentence on the synth worker; the
//! produced frames carry the backend's native sample rate and are resampled
//! by the playback engine.

pub mod stub;

use std::path::PathBuf;

use crate::buffering::chunk::AudioFrame;
use crate::error::Result;
use crate::provider::Provider;

/// Contract for synthesis backends.
pub trait Synthesizer: Send + 'static {
    /// Synthesize `text` with the given voice and time-stretch.
    ///
    /// `length_scale` is the inverse of user-facing speed: values below 1.0
    /// produce shorter audio.
    fn generate(&mut self, text: &str, speaker_id: u32, length_scale: f32) -> Result<AudioFrame>;
}

/// Configuration for a synthesizer backend.
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Voice model blob.
    pub model_path: PathBuf,
    /// Voice bank.
    pub voices_path: PathBuf,
    /// Token vocabulary file.
    pub tokens_path: PathBuf,
    /// Pronunciation data directory.
    pub data_dir: PathBuf,
    /// Optional lexicon override.
    pub lexicon_path: Option<PathBuf>,
    /// Language code for the voice.
    pub language: String,
    /// Worker threads; 0 selects the global auto value.
    pub num_threads: usize,
    /// Hardware backend the model should run on.
    pub provider: Provider,
    /// Voice index within the bank.
    pub speaker_id: u32,
    /// User-facing speed; > 1.0 speaks faster.
    pub speed: f32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            voices_path: PathBuf::new(),
            tokens_path: PathBuf::new(),
            data_dir: PathBuf::new(),
            lexicon_path: None,
            language: "en".into(),
            num_threads: 0,
            provider: Provider::Cpu,
            speaker_id: 0,
            speed: 1.0,
        }
    }
}

impl SynthesizerConfig {
    /// Length scale handed to the backend: `1.0 / speed`, so speed above
    /// 1.0 maps to shorter audio.
    pub fn length_scale(&self) -> f32 {
        if self.speed > 0.0 {
            1.0 / self.speed
        } else {
            1.0
        }
    }

    /// Whether all model blobs exist on disk.
    pub fn models_present(&self) -> bool {
        self.model_path.is_file() && self.voices_path.is_file() && self.tokens_path.is_file()
    }
}
