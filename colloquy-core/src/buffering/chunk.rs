//! Typed audio frame passed between pipeline stages.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Allocated on non-RT threads only; the audio callbacks move raw samples
/// through the lock-free rings instead.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 24000, 48000).
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
