//! `StubSynthesizer` — placeholder voice without real inference.
//!
//! Emits a quiet tone whose duration tracks the text length, so playback
//! timing and interruption behave realistically without a voice model.

use tracing::debug;

use super::Synthesizer;
use crate::buffering::chunk::AudioFrame;
use crate::error::Result;

/// Native rate the stub synthesizes at.
const STUB_SAMPLE_RATE: u32 = 24_000;

/// Seconds of audio per character of input text.
const SECS_PER_CHAR: f32 = 0.045;

/// Tone-burst stub synthesizer.
pub struct StubSynthesizer;

impl StubSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer for StubSynthesizer {
    fn generate(&mut self, text: &str, speaker_id: u32, length_scale: f32) -> Result<AudioFrame> {
        let chars = text.trim().chars().count();
        if chars == 0 {
            return Ok(AudioFrame::new(Vec::new(), STUB_SAMPLE_RATE));
        }

        let secs = chars as f32 * SECS_PER_CHAR * length_scale.max(0.05);
        let len = (secs * STUB_SAMPLE_RATE as f32) as usize;
        // Vary pitch slightly by speaker so voices are distinguishable.
        let freq = 440.0 + (speaker_id % 8) as f32 * 40.0;
        let samples: Vec<f32> = (0..len)
            .map(|i| {
                let t = i as f32 / STUB_SAMPLE_RATE as f32;
                0.2 * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect();

        debug!(chars, samples = samples.len(), "stub synthesis");
        Ok(AudioFrame::new(samples, STUB_SAMPLE_RATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_tracks_text_length() {
        let mut synth = StubSynthesizer::new();
        let short = synth.generate("Hi.", 0, 1.0).unwrap();
        let long = synth.generate("It is three o'clock.", 0, 1.0).unwrap();
        assert!(long.samples.len() > short.samples.len());
        // ≈0.9 s for a 20-character sentence.
        assert!((long.duration_secs() - 0.9).abs() < 0.1);
    }

    #[test]
    fn whitespace_produces_no_audio() {
        let mut synth = StubSynthesizer::new();
        let frame = synth.generate("   ", 0, 1.0).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn length_scale_shortens_audio() {
        let mut synth = StubSynthesizer::new();
        let normal = synth.generate("Hello there.", 0, 1.0).unwrap();
        let fast = synth.generate("Hello there.", 0, 0.5).unwrap();
        assert!(fast.samples.len() < normal.samples.len());
    }
}
