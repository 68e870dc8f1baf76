//! # colloquy-core
//!
//! Real-time voice-interaction engine: concurrent audio capture,
//! voice-activity segmentation, conversation, and interruptible streamed
//! playback.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC ring → Recognizer (VAD lock)
//!                                              │ segments
//!                                         STT worker (transcription lock)
//!                                              │ transcripts
//!                                       Conversant worker ── HTTP model
//!                                              │ replies
//!                                        Speaker worker → SPSC ring → Speaker/Headset
//! ```
//!
//! Audio callbacks are lock-free on both ends. The interrupt flag lets new
//! user speech pre-empt playback; wait mode pauses the microphone during
//! playback instead, so open speakers never hear themselves.
//!
//! The speech detector, transcriber, synthesizer, and conversation model
//! are trait-shaped collaborators; built-in stubs keep the pipeline
//! runnable without model blobs.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod assistant;
pub mod audio;
pub mod buffering;
pub mod config;
pub mod converse;
pub mod error;
pub mod interrupt;
pub mod provider;
pub mod recognize;
pub mod speak;
pub mod stt;
pub mod tts;
pub mod vad;

pub(crate) mod worker;

// Convenience re-exports for downstream crates
pub use assistant::{events::AssistantEvent, Assistant, Collaborators};
pub use config::{AssistantConfig, InterruptMode};
pub use error::ColloquyError;
pub use interrupt::InterruptController;
pub use provider::Provider;
pub use recognize::{Recognizer, SpeechSegment, Transcript};
