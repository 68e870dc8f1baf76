//! Reply synthesis and playback.
//!
//! ## Sentence streaming
//!
//! The reply is split on sentence terminators (kept, for prosody) and
//! synthesized sentence by sentence. A synthesis thread feeds a bounded(1)
//! clip channel while the speaker plays, so synthesis of sentence N+1
//! overlaps playback of sentence N and time-to-first-audio stays low.
//!
//! ```text
//! reply ──split──▶ synth thread ──clips(1)──▶ play loop ──▶ playback ring
//!                      │                          │
//!                      └───── interrupt flag ─────┘  (always mode)
//! ```
//!
//! A failed sentence is logged and skipped; the rest still play. In always
//! mode both loops break as soon as the interrupt flag is raised.

pub mod playback;
pub mod sentences;

pub use playback::{PlaybackConfig, PlaybackEngine, PlaybackOutcome, PlaybackSink};
pub use sentences::split_sentences;

use std::sync::Arc;

use crossbeam_channel::bounded;
use tracing::{debug, warn};

use crate::{
    buffering::chunk::AudioFrame, interrupt::InterruptController, tts::Synthesizer,
};

/// Turns reply text into audible sound through a [`PlaybackSink`].
pub struct Speaker<S: PlaybackSink> {
    synthesizer: Box<dyn Synthesizer>,
    sink: S,
    speaker_id: u32,
    length_scale: f32,
    /// False in wait mode: the flag is not consulted.
    heed_interrupt: bool,
    ctrl: Arc<InterruptController>,
}

impl<S: PlaybackSink> Speaker<S> {
    pub fn new(
        synthesizer: Box<dyn Synthesizer>,
        sink: S,
        speaker_id: u32,
        length_scale: f32,
        heed_interrupt: bool,
        ctrl: Arc<InterruptController>,
    ) -> Self {
        Self {
            synthesizer,
            sink,
            speaker_id,
            length_scale,
            heed_interrupt,
            ctrl,
        }
    }

    /// Speak `text`, returning how many sentences completed playback.
    ///
    /// Zero sentences (whitespace-only reply) means nothing is synthesized
    /// and the sink is never touched.
    pub fn speak(&mut self, text: &str) -> usize {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            debug!("reply had nothing to say");
            return 0;
        }

        let (clip_tx, clip_rx) = bounded::<AudioFrame>(1);
        let synthesizer = &mut self.synthesizer;
        let sink = &mut self.sink;
        let ctrl = &self.ctrl;
        let heed = self.heed_interrupt;
        let speaker_id = self.speaker_id;
        let length_scale = self.length_scale;

        let mut played = 0usize;
        std::thread::scope(|scope| {
            scope.spawn(move || {
                for sentence in &sentences {
                    if heed && ctrl.is_raised() {
                        debug!("synthesis loop interrupted");
                        break;
                    }
                    match synthesizer.generate(sentence, speaker_id, length_scale) {
                        Ok(frame) if !frame.is_empty() => {
                            if clip_tx.send(frame).is_err() {
                                break;
                            }
                        }
                        Ok(_) => debug!(sentence, "synthesis produced no audio"),
                        Err(e) => {
                            warn!(error = %e, sentence, "sentence synthesis failed; skipping");
                        }
                    }
                }
            });

            for frame in clip_rx.iter() {
                if heed && ctrl.is_raised() {
                    break;
                }
                match sink.play(&frame) {
                    PlaybackOutcome::Interrupted => break,
                    PlaybackOutcome::Completed | PlaybackOutcome::TimedOut => played += 1,
                }
            }
            // Dropping clip_rx here unblocks a producer stuck on send.
        });

        played
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ColloquyError, Result};
    use std::sync::Mutex;

    struct FakeSink {
        played: Arc<Mutex<Vec<usize>>>,
        ctrl: Arc<InterruptController>,
        raise_on_play: Option<usize>,
    }

    impl PlaybackSink for FakeSink {
        fn play(&mut self, frame: &AudioFrame) -> PlaybackOutcome {
            let mut played = self.played.lock().unwrap();
            if self.raise_on_play == Some(played.len()) {
                self.ctrl.raise();
                return PlaybackOutcome::Interrupted;
            }
            played.push(frame.samples.len());
            PlaybackOutcome::Completed
        }
    }

    struct CountingSynth {
        calls: Arc<Mutex<Vec<String>>>,
        fail_on: Option<usize>,
    }

    impl Synthesizer for CountingSynth {
        fn generate(&mut self, text: &str, _speaker_id: u32, _scale: f32) -> Result<AudioFrame> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push(text.to_string());
            if self.fail_on == Some(index) {
                return Err(ColloquyError::Synthesis("scripted failure".into()));
            }
            Ok(AudioFrame::new(vec![0.1; 1_000], 24_000))
        }
    }

    fn speaker(
        raise_on_play: Option<usize>,
        fail_on: Option<usize>,
    ) -> (
        Speaker<FakeSink>,
        Arc<Mutex<Vec<usize>>>,
        Arc<Mutex<Vec<String>>>,
        Arc<InterruptController>,
    ) {
        let ctrl = Arc::new(InterruptController::new());
        let played = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = FakeSink {
            played: Arc::clone(&played),
            ctrl: Arc::clone(&ctrl),
            raise_on_play,
        };
        let synth = CountingSynth {
            calls: Arc::clone(&calls),
            fail_on,
        };
        (
            Speaker::new(Box::new(synth), sink, 0, 1.0, true, Arc::clone(&ctrl)),
            played,
            calls,
            ctrl,
        )
    }

    #[test]
    fn every_sentence_plays_in_order() {
        let (mut speaker, played, calls, ctrl) = speaker(None, None);
        let n = speaker.speak("One. Two! Three?");
        assert_eq!(n, 3);
        assert_eq!(played.lock().unwrap().len(), 3);
        assert_eq!(
            &*calls.lock().unwrap(),
            &vec!["One.".to_string(), "Two!".to_string(), "Three?".to_string()]
        );
        assert!(!ctrl.is_raised());
    }

    #[test]
    fn whitespace_reply_touches_nothing() {
        let (mut speaker, played, calls, _) = speaker(None, None);
        assert_eq!(speaker.speak("   \n "), 0);
        assert!(played.lock().unwrap().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_sentence_is_skipped_and_rest_play() {
        let (mut speaker, played, _, _) = speaker(None, Some(1));
        let n = speaker.speak("One. Two. Three.");
        assert_eq!(n, 2);
        assert_eq!(played.lock().unwrap().len(), 2);
    }

    #[test]
    fn interrupt_stops_the_sentence_loop() {
        // The sink raises the flag on the second play; the third sentence
        // must never reach the device.
        let (mut speaker, played, calls, ctrl) = speaker(Some(1), None);
        let n = speaker.speak("One. Two. Three.");
        assert_eq!(n, 1);
        assert_eq!(played.lock().unwrap().len(), 1);
        assert!(ctrl.is_raised());
        // Synthesis may have raced one sentence ahead but not to the end.
        assert!(calls.lock().unwrap().len() <= 3);
    }
}
