//! `Assistant` — top-level lifecycle controller and worker wiring.
//!
//! ## Pipeline
//!
//! ```text
//! Capture ──frames──▶ Recognizer ──segments──▶ STT worker ──transcripts──▶
//!    ▲                     │                                      │
//!    │                interrupt flag                       Conversant worker
//!    │                     ▲                                      │
//!    └─ pause/resume ──────┼────────── replies ◀──────────────────┘
//!       (wait mode)        │              │
//!                          └──────── Speaker worker ──▶ playback ring
//! ```
//!
//! Four long-lived workers plus the two audio callbacks. Data moves through
//! bounded crossbeam channels; control signals are atomics. The pipeline is
//! a DAG with one control back-edge (the interrupt flag) and one optional
//! back-edge (the capture running flag in wait mode); both are owned here.
//!
//! ## Lifecycle
//!
//! `start()` health-checks the conversation endpoint, opens playback,
//! spawns the workers, and opens capture last; it returns only once audio
//! is streaming. `stop()` flips the running flag and joins every worker
//! with a 5 s ceiling; a missed join is logged, never fatal.

pub mod events;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    audio::{AudioCapture, CaptureConfig, MODEL_SAMPLE_RATE},
    config::{AssistantConfig, InterruptMode},
    converse::{ChatBackend, ChatOptions, Conversant},
    error::{ColloquyError, Result},
    interrupt::InterruptController,
    recognize::{run_stt_worker, Recognizer, RecognizerConfig, Transcript},
    speak::{PlaybackConfig, PlaybackEngine, PlaybackSink, Speaker},
    stt::Transcriber,
    tts::Synthesizer,
    vad::SpeechDetector,
    worker::{join_with_timeout, JOIN_TIMEOUT},
};

use events::AssistantEvent;

/// Bounded capacity of the transcript channel.
const TRANSCRIPT_CHANNEL_CAP: usize = 8;

/// Bounded capacity of the reply channel.
const REPLY_CHANNEL_CAP: usize = 8;

/// Event broadcast capacity for slow subscribers.
const EVENT_CAP: usize = 256;

/// How long workers block on their channel before rechecking the running
/// flag.
const WORKER_POLL: Duration = Duration::from_millis(100);

/// The model collaborators the assistant orchestrates.
///
/// All four are opaque behind their traits; hardware-specific backends and
/// the built-in stubs wire in identically.
pub struct Collaborators {
    pub detector: Box<dyn SpeechDetector>,
    pub transcriber: Box<dyn Transcriber>,
    pub synthesizer: Box<dyn Synthesizer>,
    pub chat: Box<dyn ChatBackend>,
}

/// The top-level assistant handle.
///
/// `Send + Sync` — all fields use interior mutability; wrap in `Arc` to
/// share with an event-forwarding task.
pub struct Assistant {
    config: AssistantConfig,
    ctrl: Arc<InterruptController>,
    running: Arc<AtomicBool>,
    /// Capture gate: read by the input callback, written here and (in wait
    /// mode) by the speaker worker.
    capture_running: Arc<AtomicBool>,
    event_tx: broadcast::Sender<AssistantEvent>,
    collaborators: Mutex<Option<Collaborators>>,
    capture: Mutex<Option<AudioCapture>>,
    recognizer: Mutex<Option<Arc<Recognizer>>>,
    workers: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl Assistant {
    /// Create an assistant. Does nothing until `start()`.
    pub fn new(config: AssistantConfig, collaborators: Collaborators) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAP);
        Self {
            config,
            ctrl: Arc::new(InterruptController::new()),
            running: Arc::new(AtomicBool::new(false)),
            capture_running: Arc::new(AtomicBool::new(true)),
            event_tx,
            collaborators: Mutex::new(Some(collaborators)),
            capture: Mutex::new(None),
            recognizer: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Start the pipeline.
    ///
    /// Blocks until both audio devices are confirmed open. Device-open and
    /// endpoint failures are fatal and leave the assistant stopped.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ColloquyError::AlreadyRunning);
        }
        match self.start_inner() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.join_workers();
                Err(e)
            }
        }
    }

    fn start_inner(&self) -> Result<()> {
        let parts = self
            .collaborators
            .lock()
            .take()
            .ok_or(ColloquyError::Config(
                "assistant cannot be restarted; create a new instance".into(),
            ))?;
        let config = &self.config;

        // ── Conversant: endpoint must answer before audio opens ───────────
        let conversant = Conversant::new(
            parts.chat,
            &config.system_prompt,
            config.max_history,
            ChatOptions {
                temperature: config.temperature,
                ..ChatOptions::default()
            },
        );
        conversant.health_check()?;

        let heed_interrupt = config.interrupt_mode == InterruptMode::Always;

        // ── Recognizer + playback ─────────────────────────────────────────
        let recognizer = Arc::new(Recognizer::new(
            parts.detector,
            parts.transcriber,
            RecognizerConfig {
                language: config.language.clone(),
                wake_word: config.wake_word.clone(),
            },
            MODEL_SAMPLE_RATE,
            Arc::clone(&self.ctrl),
        ));

        let playback = PlaybackEngine::new(
            PlaybackConfig {
                buffer_ms: config.audio_buffer_ms,
            },
            Arc::clone(&self.ctrl),
            heed_interrupt,
        )?;
        let length_scale = if config.speed > 0.0 {
            1.0 / config.speed
        } else {
            1.0
        };
        let speaker = Speaker::new(
            parts.synthesizer,
            playback,
            config.speaker_id,
            length_scale,
            heed_interrupt,
            Arc::clone(&self.ctrl),
        );

        // ── Workers ───────────────────────────────────────────────────────
        let (transcript_tx, transcript_rx) = bounded(TRANSCRIPT_CHANNEL_CAP);
        let (reply_tx, reply_rx) = bounded(REPLY_CHANNEL_CAP);

        self.spawn_worker("stt", {
            let recognizer = Arc::clone(&recognizer);
            let running = Arc::clone(&self.running);
            move || run_stt_worker(recognizer, transcript_tx, running)
        })?;

        self.spawn_worker("conversant", {
            let ctrl = Arc::clone(&self.ctrl);
            let running = Arc::clone(&self.running);
            let event_tx = self.event_tx.clone();
            move || run_conversant_worker(conversant, transcript_rx, reply_tx, ctrl, running, event_tx)
        })?;

        self.spawn_worker("speaker", {
            let ctrl = Arc::clone(&self.ctrl);
            let running = Arc::clone(&self.running);
            let capture_running = Arc::clone(&self.capture_running);
            let event_tx = self.event_tx.clone();
            let mode = config.interrupt_mode;
            let post_delay = Duration::from_millis(config.post_playback_delay_ms);
            move || {
                run_speaker_worker(
                    speaker,
                    reply_rx,
                    capture_running,
                    ctrl,
                    running,
                    mode,
                    post_delay,
                    event_tx,
                )
            }
        })?;

        // ── Capture opens last, once the rest of the pipeline is wired ────
        self.capture_running.store(true, Ordering::SeqCst);
        let sink_recognizer = Arc::clone(&recognizer);
        let capture = AudioCapture::start(
            CaptureConfig {
                model_sample_rate: config.detector.sample_rate,
                ..CaptureConfig::default()
            },
            Arc::clone(&self.capture_running),
            move |frame| sink_recognizer.accept_waveform(frame),
        )?;

        *self.capture.lock() = Some(capture);
        *self.recognizer.lock() = Some(recognizer);
        let _ = self.event_tx.send(AssistantEvent::Listening);
        info!(mode = %config.interrupt_mode, "assistant started — listening");
        Ok(())
    }

    /// Stop the pipeline and join every worker.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ColloquyError::NotRunning);
        }
        info!("assistant stop requested");

        // Cut any in-flight playback so the speaker worker can exit.
        self.ctrl.raise();

        if let Some(recognizer) = self.recognizer.lock().take() {
            recognizer.close();
        }
        if let Some(capture) = self.capture.lock().take() {
            capture.stop();
        }
        self.join_workers();

        self.ctrl.clear();
        self.ctrl.set_busy(false);
        info!("assistant stopped");
        Ok(())
    }

    /// Whether the pipeline is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribe to pipeline events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AssistantEvent> {
        self.event_tx.subscribe()
    }

    fn spawn_worker<F>(&self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(body)?;
        self.workers.lock().push(handle);
        Ok(())
    }

    fn join_workers(&self) {
        for handle in self.workers.lock().drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            join_with_timeout(handle, JOIN_TIMEOUT, &name);
        }
    }
}

/// Conversant worker: one reply per transcript.
///
/// Clearing the interrupt flag here is step 2 of the interruption protocol:
/// the flag's cause is this very transcript, and the upcoming reply must
/// not be pre-empted by it.
pub fn run_conversant_worker(
    mut conversant: Conversant,
    transcript_rx: Receiver<Transcript>,
    reply_tx: Sender<String>,
    ctrl: Arc<InterruptController>,
    running: Arc<AtomicBool>,
    event_tx: broadcast::Sender<AssistantEvent>,
) {
    while running.load(Ordering::SeqCst) {
        let transcript = match transcript_rx.recv_timeout(WORKER_POLL) {
            Ok(t) => t,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        ctrl.clear();
        ctrl.set_busy(true);
        let _ = event_tx.send(AssistantEvent::Heard {
            text: transcript.text.clone(),
        });

        let reply = conversant.chat(&transcript.text);
        let _ = event_tx.send(AssistantEvent::Reply {
            text: reply.clone(),
        });
        if reply_tx.send(reply).is_err() {
            break;
        }
    }
    debug!("conversant worker exited");
}

/// Speaker worker: plays each reply, honoring the interrupt policy.
#[allow(clippy::too_many_arguments)]
pub fn run_speaker_worker<S: PlaybackSink>(
    mut speaker: Speaker<S>,
    reply_rx: Receiver<String>,
    capture_running: Arc<AtomicBool>,
    ctrl: Arc<InterruptController>,
    running: Arc<AtomicBool>,
    mode: InterruptMode,
    post_playback_delay: Duration,
    event_tx: broadcast::Sender<AssistantEvent>,
) {
    while running.load(Ordering::SeqCst) {
        let reply = match reply_rx.recv_timeout(WORKER_POLL) {
            Ok(r) => r,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        let _ = event_tx.send(AssistantEvent::SpeakingStarted);
        match mode {
            InterruptMode::Wait => {
                // Half duplex: gate the microphone for the whole reply so
                // playback is never captured as user speech.
                capture_running.store(false, Ordering::SeqCst);
                let played = speaker.speak(&reply);
                if played > 0 {
                    std::thread::sleep(post_playback_delay);
                }
                capture_running.store(true, Ordering::SeqCst);
            }
            InterruptMode::Always => {
                speaker.speak(&reply);
                if ctrl.is_raised() {
                    let mut drained = 0usize;
                    while reply_rx.try_recv().is_ok() {
                        drained += 1;
                    }
                    if drained > 0 {
                        warn!(drained, "discarded queued replies after interrupt");
                    }
                    let _ = event_tx.send(AssistantEvent::Interrupted);
                }
            }
        }
        let _ = event_tx.send(AssistantEvent::SpeakingFinished);

        if reply_rx.is_empty() {
            ctrl.set_busy(false);
        }
    }
    debug!("speaker worker exited");
}
