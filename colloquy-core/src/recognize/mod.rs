//! Two-lock recognizer: fast voice-activity ingestion, slow transcription.
//!
//! ## Locking design
//!
//! One mutex protects detector state and is held only around a handful of
//! cheap calls (feed, poll, pop — well under 10 ms). A second, independent
//! mutex serialises transcription (100–500 ms per segment). The audio path
//! never waits on transcription: `accept_waveform` touches only the
//! detector lock and releases it before pushing to the segment channel.
//!
//! ```text
//! capture consumer ──accept_waveform──▶ [detector lock] ──▶ segment channel
//!                                                               │
//! stt worker ◀──────────────────────────────────────────────────┘
//!     └── transcribe_segment ──▶ [transcription lock]
//! ```

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    interrupt::InterruptController,
    stt::{language_sentinel, Transcriber},
    vad::SpeechDetector,
};

/// Bounded capacity of the completed-segment channel.
pub const SEGMENT_CHANNEL_CAP: usize = 8;

/// How long the STT worker blocks on the segment channel before rechecking
/// the running flag.
const WORKER_POLL: Duration = Duration::from_millis(100);

/// Contiguous samples covering one utterance at the model sample rate.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SpeechSegment {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A recognised user utterance, already wake-word gated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    /// Whether a wake-word prefix was stripped from the raw decode.
    pub wake_stripped: bool,
}

/// Recognizer configuration.
#[derive(Debug, Clone, Default)]
pub struct RecognizerConfig {
    /// Language hint; "auto" maps to the transcriber's empty sentinel.
    pub language: String,
    /// Optional gating phrase. Transcripts without it are dropped.
    pub wake_word: Option<String>,
}

/// The recognizer: converts the capture stream into a channel of
/// [`Transcript`] values.
pub struct Recognizer {
    detector: Mutex<Box<dyn SpeechDetector>>,
    transcriber: Mutex<Box<dyn Transcriber>>,
    segment_tx: Sender<SpeechSegment>,
    segment_rx: Receiver<SpeechSegment>,
    ctrl: Arc<InterruptController>,
    was_speaking: AtomicBool,
    closed: AtomicBool,
    dropped_segments: AtomicUsize,
    language: String,
    wake_word: Option<String>,
    sample_rate: u32,
}

impl Recognizer {
    pub fn new(
        detector: Box<dyn SpeechDetector>,
        transcriber: Box<dyn Transcriber>,
        config: RecognizerConfig,
        sample_rate: u32,
        ctrl: Arc<InterruptController>,
    ) -> Self {
        let (segment_tx, segment_rx) = bounded(SEGMENT_CHANNEL_CAP);
        let wake_word = config
            .wake_word
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty());
        Self {
            detector: Mutex::new(detector),
            transcriber: Mutex::new(transcriber),
            segment_tx,
            segment_rx,
            ctrl,
            was_speaking: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            dropped_segments: AtomicUsize::new(0),
            language: language_sentinel(&config.language).to_string(),
            wake_word,
            sample_rate,
        }
    }

    /// Feed a capture frame through voice-activity detection.
    ///
    /// Called from the capture consumer. Holds the detector lock only for
    /// the feed/poll/pop calls; completed segments are pushed to the
    /// channel after the lock is released. A full channel drops the
    /// segment with a warning — losing speech is preferable to blocking
    /// the audio path.
    pub fn accept_waveform(&self, samples: &[f32]) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let mut completed: Vec<Vec<f32>> = Vec::new();
        let speaking;
        {
            let mut detector = self.detector.lock();
            detector.accept(samples);
            speaking = detector.is_speaking();
            while !detector.is_empty() {
                completed.push(detector.front().to_vec());
                detector.pop();
            }
        }

        // Speech-start transition while a reply is in flight pre-empts it.
        let was = self.was_speaking.swap(speaking, Ordering::SeqCst);
        if speaking && !was && self.ctrl.raise_if_busy() {
            info!("new speech during reply; interrupt raised");
        }

        for samples in completed {
            let segment = SpeechSegment {
                samples,
                sample_rate: self.sample_rate,
            };
            match self.segment_tx.try_send(segment) {
                Ok(()) => {}
                Err(TrySendError::Full(seg)) => {
                    let count = self.dropped_segments.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        count,
                        duration_secs = seg.duration_secs(),
                        "segment channel full; dropping segment"
                    );
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// A receiver for completed speech segments.
    pub fn segments(&self) -> Receiver<SpeechSegment> {
        self.segment_rx.clone()
    }

    /// Transcribe one segment under the transcription lock.
    ///
    /// Returns `None` for empty decodes and for transcripts the wake-word
    /// gate rejects. The detector lock is never touched here.
    pub fn transcribe_segment(&self, segment: &SpeechSegment) -> Result<Option<Transcript>> {
        let text = {
            let mut transcriber = self.transcriber.lock();
            transcriber.transcribe(&segment.samples, &self.language)?
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        match &self.wake_word {
            None => Ok(Some(Transcript {
                text: text.to_string(),
                wake_stripped: false,
            })),
            Some(wake) => match apply_wake_word(text, wake) {
                Some(stripped) => Ok(Some(Transcript {
                    text: stripped,
                    wake_stripped: true,
                })),
                None => {
                    debug!(text, "transcript without wake word dropped");
                    Ok(None)
                }
            },
        }
    }

    /// Reset detector state (catastrophic resync).
    pub fn clear(&self) {
        self.detector.lock().clear();
        self.was_speaking.store(false, Ordering::SeqCst);
    }

    /// Stop accepting audio. Pending segments may still be transcribed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Segments dropped so far because the channel was full.
    pub fn dropped_segments(&self) -> usize {
        self.dropped_segments.load(Ordering::Relaxed)
    }
}

/// Apply the wake-word gate to a decoded transcript.
///
/// - Trigger absent → `None` (transcript dropped).
/// - Trigger is the entire utterance → `Some("Hello")`.
/// - Otherwise the trigger and any adjacent punctuation/whitespace are
///   stripped and the remainder forwarded.
pub fn apply_wake_word(text: &str, wake: &str) -> Option<String> {
    let trimmed = text.trim();
    let at = find_ignore_ascii_case(trimmed, wake)?;
    let remainder = trimmed[at + wake.len()..]
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?' | ';' | ':'));
    if remainder.is_empty() {
        Some("Hello".to_string())
    } else {
        Some(remainder.to_string())
    }
}

/// Byte-wise ASCII-case-insensitive substring search.
///
/// Safe on UTF-8: an ASCII needle can never match inside a multi-byte
/// sequence, and a non-ASCII needle requires an exact byte match.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// STT worker: drain the segment channel, transcribe, forward transcripts.
///
/// Transcriber failures are logged per segment and the worker continues.
/// Exits when `running` drops or either channel closes.
pub fn run_stt_worker(
    recognizer: Arc<Recognizer>,
    transcript_tx: Sender<Transcript>,
    running: Arc<AtomicBool>,
) {
    let segments = recognizer.segments();
    while running.load(Ordering::SeqCst) {
        let segment = match segments.recv_timeout(WORKER_POLL) {
            Ok(segment) => segment,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        match recognizer.transcribe_segment(&segment) {
            Ok(Some(transcript)) => {
                info!(
                    text = transcript.text.as_str(),
                    duration_secs = segment.duration_secs(),
                    "transcript"
                );
                if transcript_tx.send(transcript).is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!(
                    duration_secs = segment.duration_secs(),
                    "segment produced no forwardable transcript"
                );
            }
            Err(e) => {
                warn!(error = %e, "transcription failed; segment dropped");
            }
        }
    }
    debug!("stt worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Detector that replays a script: each `accept` call takes the next
    /// (speaking, segments) entry.
    struct ScriptedDetector {
        script: Vec<(bool, Vec<Vec<f32>>)>,
        idx: usize,
        queue: std::collections::VecDeque<Vec<f32>>,
        speaking: bool,
    }

    impl ScriptedDetector {
        fn new(script: Vec<(bool, Vec<Vec<f32>>)>) -> Self {
            Self {
                script,
                idx: 0,
                queue: Default::default(),
                speaking: false,
            }
        }
    }

    impl SpeechDetector for ScriptedDetector {
        fn accept(&mut self, _samples: &[f32]) {
            if let Some((speaking, segments)) = self.script.get(self.idx) {
                self.speaking = *speaking;
                self.queue.extend(segments.iter().cloned());
                self.idx += 1;
            }
        }

        fn is_speaking(&self) -> bool {
            self.speaking
        }

        fn is_empty(&self) -> bool {
            self.queue.is_empty()
        }

        fn front(&self) -> &[f32] {
            self.queue.front().map(Vec::as_slice).unwrap_or(&[])
        }

        fn pop(&mut self) {
            self.queue.pop_front();
        }

        fn clear(&mut self) {
            self.queue.clear();
            self.speaking = false;
        }
    }

    struct EchoTranscriber {
        reply: String,
        delay: Duration,
    }

    impl Transcriber for EchoTranscriber {
        fn transcribe(&mut self, _samples: &[f32], _language: &str) -> Result<String> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            Ok(self.reply.clone())
        }
    }

    fn recognizer_with(
        script: Vec<(bool, Vec<Vec<f32>>)>,
        reply: &str,
        wake_word: Option<&str>,
    ) -> Recognizer {
        Recognizer::new(
            Box::new(ScriptedDetector::new(script)),
            Box::new(EchoTranscriber {
                reply: reply.into(),
                delay: Duration::ZERO,
            }),
            RecognizerConfig {
                language: "auto".into(),
                wake_word: wake_word.map(String::from),
            },
            16_000,
            Arc::new(InterruptController::new()),
        )
    }

    #[test]
    fn completed_segments_reach_the_channel() {
        let rec = recognizer_with(
            vec![(true, vec![]), (false, vec![vec![0.1; 1_600]])],
            "hi",
            None,
        );
        rec.accept_waveform(&[0.0; 512]);
        rec.accept_waveform(&[0.0; 512]);

        let segment = rec.segments().try_recv().expect("segment expected");
        assert_eq!(segment.samples.len(), 1_600);
        assert_eq!(segment.sample_rate, 16_000);
    }

    #[test]
    fn full_channel_drops_segment_and_counts() {
        let script: Vec<_> = (0..SEGMENT_CHANNEL_CAP + 2)
            .map(|_| (false, vec![vec![0.1; 160]]))
            .collect();
        let rec = recognizer_with(script, "hi", None);
        for _ in 0..SEGMENT_CHANNEL_CAP + 2 {
            rec.accept_waveform(&[0.0; 512]);
        }
        assert_eq!(rec.dropped_segments(), 2);
    }

    #[test]
    fn speech_start_raises_interrupt_only_while_busy() {
        let ctrl = Arc::new(InterruptController::new());
        let rec = Recognizer::new(
            Box::new(ScriptedDetector::new(vec![
                (true, vec![]),
                (false, vec![]),
                (true, vec![]),
            ])),
            Box::new(EchoTranscriber {
                reply: "hi".into(),
                delay: Duration::ZERO,
            }),
            RecognizerConfig::default(),
            16_000,
            Arc::clone(&ctrl),
        );

        // Not busy: the transition must not raise.
        rec.accept_waveform(&[0.0; 512]);
        assert!(!ctrl.is_raised());

        rec.accept_waveform(&[0.0; 512]); // back to silence
        ctrl.set_busy(true);
        rec.accept_waveform(&[0.0; 512]); // speech starts again
        assert!(ctrl.is_raised());
    }

    #[test]
    fn empty_decode_is_suppressed() {
        let rec = recognizer_with(vec![], "   ", None);
        let segment = SpeechSegment {
            samples: vec![0.1; 1_600],
            sample_rate: 16_000,
        };
        assert_eq!(rec.transcribe_segment(&segment).unwrap(), None);
    }

    #[test]
    fn vad_lock_is_free_while_transcription_runs() {
        let rec = Arc::new(Recognizer::new(
            Box::new(ScriptedDetector::new(vec![(false, vec![]); 64])),
            Box::new(EchoTranscriber {
                reply: "slow".into(),
                delay: Duration::from_millis(300),
            }),
            RecognizerConfig::default(),
            16_000,
            Arc::new(InterruptController::new()),
        ));

        let rec_slow = Arc::clone(&rec);
        let handle = std::thread::spawn(move || {
            let segment = SpeechSegment {
                samples: vec![0.1; 1_600],
                sample_rate: 16_000,
            };
            rec_slow.transcribe_segment(&segment).unwrap();
        });

        // Give the transcription thread time to take the slow lock.
        std::thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        rec.accept_waveform(&[0.0; 512]);
        let elapsed = start.elapsed();
        handle.join().unwrap();

        assert!(
            elapsed < Duration::from_millis(100),
            "audio path waited on transcription: {elapsed:?}"
        );
    }

    // ── Wake-word gate ──────────────────────────────────────────────────

    #[test]
    fn wake_word_absent_drops_transcript() {
        assert_eq!(apply_wake_word("what time is it", "hey assistant"), None);
    }

    #[test]
    fn wake_word_prefix_is_stripped_with_punctuation() {
        assert_eq!(
            apply_wake_word("Hey assistant, what time is it", "hey assistant"),
            Some("what time is it".to_string())
        );
        assert_eq!(
            apply_wake_word("hey assistant what time is it", "hey assistant"),
            Some("what time is it".to_string())
        );
    }

    #[test]
    fn wake_word_alone_substitutes_hello() {
        assert_eq!(
            apply_wake_word("hey assistant", "hey assistant"),
            Some("Hello".to_string())
        );
        assert_eq!(
            apply_wake_word("Hey assistant!", "hey assistant"),
            Some("Hello".to_string())
        );
    }

    #[test]
    fn gated_recognizer_forwards_only_wake_word_transcripts() {
        let rec = recognizer_with(vec![], "hey assistant what time is it", Some("hey assistant"));
        let segment = SpeechSegment {
            samples: vec![0.1; 1_600],
            sample_rate: 16_000,
        };
        let transcript = rec.transcribe_segment(&segment).unwrap().unwrap();
        assert_eq!(transcript.text, "what time is it");
        assert!(transcript.wake_stripped);

        let rec = recognizer_with(vec![], "what time is it", Some("hey assistant"));
        assert_eq!(rec.transcribe_segment(&segment).unwrap(), None);
    }
}
