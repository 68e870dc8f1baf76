//! Speech-activity detection abstraction.
//!
//! The [`SpeechDetector`] trait mirrors the queue-style interface of the
//! neural segmenters this engine is built to host: audio is fed in with
//! `accept`, the live speaking state is polled, and completed segments are
//! consumed through `front`/`pop`. Swap in any backend without touching the
//! recognizer.

pub mod energy;

pub use energy::EnergySegmenter;

/// Detector configuration.
///
/// `threshold` is an activation level in [0, 1]; backends map it onto their
/// own score scale. Durations are in seconds of audio at `sample_rate`.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Activation threshold in [0, 1].
    pub threshold: f32,
    /// Silence required to close a segment.
    pub min_silence_secs: f32,
    /// Speech required to open a segment; shorter bursts never emit.
    pub min_speech_secs: f32,
    /// Forced segment close once this much speech has accumulated.
    pub max_speech_secs: f32,
    /// Analysis window in samples.
    pub window_size: usize,
    /// Sample rate the detector operates at.
    pub sample_rate: u32,
    /// Detector thread count. Lightweight detectors run single-threaded.
    pub num_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_silence_secs: 0.5,
            min_speech_secs: 0.25,
            max_speech_secs: 15.0,
            window_size: 512,
            sample_rate: 16_000,
            num_threads: 1,
        }
    }
}

/// Trait for all speech-activity detector backends.
///
/// Implementors are stateful: they buffer partial windows, track the
/// speaking state machine, and queue completed segments.
pub trait SpeechDetector: Send + 'static {
    /// Feed samples at the configured sample rate.
    fn accept(&mut self, samples: &[f32]);

    /// Whether the detector currently observes active speech.
    fn is_speaking(&self) -> bool;

    /// Whether the completed-segment queue is empty.
    fn is_empty(&self) -> bool;

    /// Samples of the oldest completed segment. Empty slice when none.
    fn front(&self) -> &[f32];

    /// Discard the oldest completed segment.
    fn pop(&mut self);

    /// Reset all state: partial windows, speaking state, queued segments.
    fn clear(&mut self);
}
