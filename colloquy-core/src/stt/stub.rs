//! `StubTranscriber` — placeholder backend without real inference.
//!
//! Used when the model blobs are absent so the full pipeline can still be
//! exercised end-to-end, and by tests.

use tracing::debug;

use super::Transcriber;
use crate::error::Result;

/// Echo-style stub transcriber.
///
/// Produces a deterministic description of each segment it is handed.
pub struct StubTranscriber {
    segment_count: u32,
}

impl StubTranscriber {
    pub fn new() -> Self {
        Self { segment_count: 0 }
    }
}

impl Default for StubTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcriber for StubTranscriber {
    fn transcribe(&mut self, samples: &[f32], language: &str) -> Result<String> {
        if samples.len() < 160 {
            return Ok(String::new());
        }
        self.segment_count += 1;
        debug!(
            segment = self.segment_count,
            samples = samples.len(),
            language,
            "stub transcription"
        );
        Ok(format!(
            "segment {} with {} samples",
            self.segment_count,
            samples.len()
        ))
    }
}
