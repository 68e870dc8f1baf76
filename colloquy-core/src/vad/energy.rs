//! Energy-based speech segmenter.
//!
//! ## Algorithm
//!
//! 1. Accumulate accepted samples into fixed analysis windows.
//! 2. Classify each window by RMS against the activation threshold.
//! 3. Idle → Speaking after `min_speech_secs` of consecutive active
//!    windows; the pre-activation run is included in the segment.
//! 4. Speaking → Idle after `min_silence_secs` of inactive windows; the
//!    segment is closed and queued.
//! 5. A segment reaching `max_speech_secs` is force-closed; the detector
//!    stays in Speaking and keeps accumulating.

use std::collections::VecDeque;

use super::{DetectorConfig, SpeechDetector};

/// The 0–1 activation threshold maps onto RMS full scale at this level.
/// A threshold of 0.5 therefore corresponds to an RMS of 0.03, the middle
/// of the usable range for close-talking microphones.
const RMS_FULL_SCALE: f32 = 0.06;

/// Energy segmenter driving the Idle/Speaking state machine on windowed RMS.
pub struct EnergySegmenter {
    rms_threshold: f32,
    window_size: usize,
    min_speech_samples: usize,
    min_silence_samples: usize,
    max_speech_samples: usize,

    /// Accepted samples awaiting a full analysis window.
    window_buf: Vec<f32>,
    /// Active-run samples accumulated before the segment opens.
    pending: Vec<f32>,
    /// Samples of the open segment while Speaking.
    current: Vec<f32>,
    /// Completed segments awaiting `front()`/`pop()`.
    completed: VecDeque<Vec<f32>>,

    speaking: bool,
    speech_run: usize,
    silence_run: usize,
}

impl EnergySegmenter {
    pub fn new(config: &DetectorConfig) -> Self {
        let rate = config.sample_rate as f32;
        Self {
            rms_threshold: (config.threshold.clamp(0.0, 1.0) * RMS_FULL_SCALE).max(1e-4),
            window_size: config.window_size.max(1),
            min_speech_samples: (config.min_speech_secs * rate) as usize,
            min_silence_samples: ((config.min_silence_secs * rate) as usize).max(1),
            max_speech_samples: ((config.max_speech_secs * rate) as usize).max(1),
            window_buf: Vec::new(),
            pending: Vec::new(),
            current: Vec::new(),
            completed: VecDeque::new(),
            speaking: false,
            speech_run: 0,
            silence_run: 0,
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }

    fn process_window(&mut self, window: &[f32]) {
        let active = Self::rms(window) >= self.rms_threshold;

        if !self.speaking {
            if active {
                self.pending.extend_from_slice(window);
                self.speech_run += window.len();
                if self.speech_run >= self.min_speech_samples {
                    self.speaking = true;
                    self.silence_run = 0;
                    self.current = std::mem::take(&mut self.pending);
                }
            } else {
                self.speech_run = 0;
                self.pending.clear();
            }
            return;
        }

        self.current.extend_from_slice(window);
        if active {
            self.silence_run = 0;
        } else {
            self.silence_run += window.len();
        }

        if self.silence_run >= self.min_silence_samples {
            // A segment made only of the trailing silence (possible right
            // after a forced close) is discarded, not emitted.
            if self.current.len() > self.silence_run {
                self.completed.push_back(std::mem::take(&mut self.current));
            } else {
                self.current.clear();
            }
            self.speaking = false;
            self.speech_run = 0;
            self.silence_run = 0;
        } else if self.current.len() >= self.max_speech_samples {
            // Forced close; still speaking, keep accumulating.
            self.completed.push_back(std::mem::take(&mut self.current));
        }
    }
}

impl SpeechDetector for EnergySegmenter {
    fn accept(&mut self, samples: &[f32]) {
        self.window_buf.extend_from_slice(samples);
        while self.window_buf.len() >= self.window_size {
            let window: Vec<f32> = self.window_buf.drain(..self.window_size).collect();
            self.process_window(&window);
        }
    }

    fn is_speaking(&self) -> bool {
        self.speaking
    }

    fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    fn front(&self) -> &[f32] {
        self.completed.front().map(Vec::as_slice).unwrap_or(&[])
    }

    fn pop(&mut self) {
        self.completed.pop_front();
    }

    fn clear(&mut self) {
        self.window_buf.clear();
        self.pending.clear();
        self.current.clear();
        self.completed.clear();
        self.speaking = false;
        self.speech_run = 0;
        self.silence_run = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DetectorConfig {
        DetectorConfig {
            threshold: 0.5,
            min_silence_secs: 0.05,
            min_speech_secs: 0.05,
            max_speech_secs: 0.5,
            window_size: 160,
            sample_rate: 16_000,
            num_threads: 1,
        }
    }

    fn loud(len: usize) -> Vec<f32> {
        vec![0.5; len]
    }

    fn quiet(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    #[test]
    fn silence_never_opens_a_segment() {
        let mut det = EnergySegmenter::new(&test_config());
        det.accept(&quiet(16_000));
        assert!(!det.is_speaking());
        assert!(det.is_empty());
    }

    #[test]
    fn burst_shorter_than_min_speech_never_emits() {
        let mut det = EnergySegmenter::new(&test_config());
        // min_speech is 800 samples; a 640-sample burst must not open.
        det.accept(&loud(640));
        det.accept(&quiet(16_000));
        assert!(!det.is_speaking());
        assert!(det.is_empty());
    }

    #[test]
    fn speech_then_silence_emits_one_segment() {
        let mut det = EnergySegmenter::new(&test_config());
        det.accept(&loud(3_200));
        assert!(det.is_speaking());
        det.accept(&quiet(1_600));
        assert!(!det.is_speaking());
        assert!(!det.is_empty());

        // The segment covers the burst (plus trailing silence windows up
        // to the close).
        let len = det.front().len();
        assert!(len >= 3_200, "segment too short: {len}");
        det.pop();
        assert!(det.is_empty());
    }

    #[test]
    fn long_speech_is_force_closed_into_multiple_segments() {
        let mut det = EnergySegmenter::new(&test_config());
        // max_speech is 8 000 samples; 2 s of speech → at least 4 segments.
        det.accept(&loud(32_000));
        det.accept(&quiet(1_600));

        let mut segments = 0;
        while !det.is_empty() {
            segments += 1;
            det.pop();
        }
        assert!(segments >= 4, "expected ≥4 segments, got {segments}");
    }

    #[test]
    fn partial_windows_accumulate_across_accept_calls() {
        let mut det = EnergySegmenter::new(&test_config());
        // 100-sample pushes never fill a 160-sample window individually.
        for _ in 0..40 {
            det.accept(&loud(100));
        }
        assert!(det.is_speaking());
    }

    #[test]
    fn clear_resets_everything() {
        let mut det = EnergySegmenter::new(&test_config());
        det.accept(&loud(3_200));
        det.accept(&quiet(1_600));
        assert!(!det.is_empty());
        det.clear();
        assert!(det.is_empty());
        assert!(!det.is_speaking());
        assert!(det.front().is_empty());
    }
}
