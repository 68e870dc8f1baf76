//! Audio capture via cpal.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory (beyond the one-time scratch resize)
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! The callback downmixes to mono and writes into an SPSC ring producer
//! whose `push_slice` is lock-free. Resampling to the model rate, frame
//! assembly, and delivery to the recognizer all happen on the consumer
//! thread, where allocation is allowed.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio
//! on macOS). The stream is therefore created and dropped on the dedicated
//! capture thread; a sync mpsc channel propagates open success/failure back
//! to the `start()` caller.

pub mod device;
pub mod resample;

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    buffering::{create_capture_ring, AudioConsumer, AudioProducer, Consumer, Producer},
    error::{ColloquyError, Result},
    worker::{join_with_timeout, JOIN_TIMEOUT},
};

/// Sample rate the recognizer contract fixes for delivered frames.
pub const MODEL_SAMPLE_RATE: u32 = 16_000;

/// Samples per delivered frame: 32 ms at 16 kHz.
pub const FRAME_SAMPLES: usize = 512;

/// Log every Nth dropped callback chunk to avoid flooding.
const DROP_LOG_EVERY: usize = 50;

/// Sleep when the ring is empty. Short enough that a fresh 32 ms frame is
/// picked up almost immediately.
const EMPTY_SLEEP: Duration = Duration::from_micros(100);

/// Sleep while paused; the callback is discarding input anyway.
const PAUSED_SLEEP: Duration = Duration::from_millis(5);

/// Capture configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Rate frames are delivered at. Fixed at 16 kHz by the recognizer.
    pub model_sample_rate: u32,
    /// Samples per frame handed to the sink.
    pub frame_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            model_sample_rate: MODEL_SAMPLE_RATE,
            frame_samples: FRAME_SAMPLES,
        }
    }
}

/// Handle to an active capture session.
///
/// `pause`/`resume`/`stop` all take `&self`; the handle is shared between
/// the orchestrator and the speaker worker (wait mode gates capture).
pub struct AudioCapture {
    /// `false` while paused — the callback discards input.
    running: Arc<AtomicBool>,
    /// `true` once `stop()` has been requested.
    shutdown: Arc<AtomicBool>,
    /// Callback chunks dropped because the ring was full.
    dropped: Arc<AtomicUsize>,
    join: Mutex<Option<std::thread::JoinHandle<()>>>,
    device_rate: u32,
}

impl AudioCapture {
    /// Open the default input device and start delivering frames to `sink`.
    ///
    /// Returns only after the device is confirmed streaming. The sink is
    /// invoked on the capture consumer thread with an owned frame of
    /// `config.frame_samples` samples at `config.model_sample_rate`.
    ///
    /// `running` is the shared capture gate: the callback discards input
    /// while it reads false. The caller may hold extra clones (wait mode
    /// gates capture from the speaker worker).
    ///
    /// # Errors
    /// `ColloquyError::NoDefaultInputDevice` when no microphone is
    /// available, or `ColloquyError::AudioStream` if cpal fails to build
    /// the stream. Device-open failure is fatal to the caller.
    pub fn start<F>(config: CaptureConfig, running: Arc<AtomicBool>, sink: F) -> Result<Self>
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        running.store(true, Ordering::SeqCst);
        let shutdown = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicUsize::new(0));

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        let thread_running = Arc::clone(&running);
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_dropped = Arc::clone(&dropped);
        let thread_config = config.clone();

        let handle = std::thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                // Open the device on THIS thread — cpal::Stream is !Send.
                let opened = open_input_stream(&thread_running, &thread_dropped);
                let (stream, device_rate, consumer) = match opened {
                    Ok(parts) => {
                        let _ = open_tx.send(Ok(parts.1));
                        parts
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };

                run_consumer(
                    thread_config,
                    device_rate,
                    consumer,
                    sink,
                    &thread_running,
                    &thread_shutdown,
                );

                // Stream drops here, releasing the device on its own thread.
                drop(stream);
            })?;

        match open_rx.recv() {
            Ok(Ok(device_rate)) => {
                info!(device_rate, "capture started");
                Ok(Self {
                    running,
                    shutdown,
                    dropped,
                    join: Mutex::new(Some(handle)),
                    device_rate,
                })
            }
            Ok(Err(e)) => {
                shutdown.store(true, Ordering::SeqCst);
                join_with_timeout(handle, JOIN_TIMEOUT, "capture");
                Err(e)
            }
            Err(_) => {
                shutdown.store(true, Ordering::SeqCst);
                Err(ColloquyError::AudioStream(
                    "capture thread died before confirming device open".into(),
                ))
            }
        }
    }

    /// Pause capture: the callback discards input and the consumer sleeps.
    /// The device stays open. Idempotent.
    pub fn pause(&self) {
        if !self.shutdown.load(Ordering::SeqCst) && self.running.swap(false, Ordering::SeqCst) {
            debug!("capture paused");
        }
    }

    /// Resume capture after `pause()`. Idempotent; no-op after `stop()`.
    pub fn resume(&self) {
        if !self.shutdown.load(Ordering::SeqCst) && !self.running.swap(true, Ordering::SeqCst) {
            debug!("capture resumed");
        }
    }

    /// Whether capture is currently delivering frames.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.shutdown.load(Ordering::SeqCst)
    }

    /// Callback chunks dropped so far because the ring was full.
    pub fn dropped_chunks(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Native rate the device negotiated (frames are still delivered at the
    /// model rate).
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Stop capture, join the capture thread, and close the device.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.join.lock().take() {
            join_with_timeout(handle, JOIN_TIMEOUT, "capture");
        }
        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            info!(dropped, "capture stopped with dropped chunks");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the default input device and wire its callback to a fresh ring.
fn open_input_stream(
    running: &Arc<AtomicBool>,
    dropped: &Arc<AtomicUsize>,
) -> Result<(Stream, u32, AudioConsumer)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(ColloquyError::NoDefaultInputDevice)?;
    let name = device.name().unwrap_or_else(|_| "unknown".into());

    let supported = device
        .default_input_config()
        .map_err(|e| ColloquyError::AudioDevice(e.to_string()))?;
    let device_rate = supported.sample_rate().0;
    let channels = supported.channels();

    info!(
        device = name.as_str(),
        device_rate,
        channels,
        "opening input device"
    );
    if device_rate != MODEL_SAMPLE_RATE {
        info!(
            device_rate,
            model_rate = MODEL_SAMPLE_RATE,
            "device rate differs from model rate; resampler will be installed"
        );
    }

    let (producer, consumer) = create_capture_ring(device_rate);

    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(device_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = build_stream_for_format(
        &device,
        &config,
        supported.sample_format(),
        channels,
        producer,
        Arc::clone(running),
        Arc::clone(dropped),
    )?;

    stream
        .play()
        .map_err(|e| ColloquyError::AudioStream(e.to_string()))?;

    Ok((stream, device_rate, consumer))
}

/// Build the input stream for the negotiated sample format.
///
/// Each callback downmixes to mono into a reused scratch buffer and pushes
/// to the ring; a push shortfall drops the whole chunk and bumps the
/// counter (logged every [`DROP_LOG_EVERY`]th drop).
fn build_stream_for_format(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    channels: u16,
    mut producer: AudioProducer,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
) -> Result<Stream> {
    let ch = channels as usize;
    let mut mono_buf: Vec<f32> = Vec::new();

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                push_mono(&mut producer, &dropped, &mut mono_buf, data, ch, |s| s);
            },
            |err| error!("audio input stream error: {err}"),
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                push_mono(&mut producer, &dropped, &mut mono_buf, data, ch, |s| {
                    f32::from(s) / 32_768.0
                });
            },
            |err| error!("audio input stream error: {err}"),
            None,
        ),
        SampleFormat::U8 => device.build_input_stream(
            config,
            move |data: &[u8], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                push_mono(&mut producer, &dropped, &mut mono_buf, data, ch, |s| {
                    (f32::from(s) - 128.0) / 128.0
                });
            },
            |err| error!("audio input stream error: {err}"),
            None,
        ),
        fmt => {
            return Err(ColloquyError::AudioStream(format!(
                "unsupported sample format: {fmt:?}"
            )))
        }
    }
    .map_err(|e| ColloquyError::AudioStream(e.to_string()))?;

    Ok(stream)
}

/// Downmix one callback chunk to mono and push it to the ring.
fn push_mono<T: Copy>(
    producer: &mut AudioProducer,
    dropped: &Arc<AtomicUsize>,
    mono_buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    convert: impl Fn(T) -> f32,
) {
    let frames = data.len() / channels.max(1);
    mono_buf.resize(frames, 0.0);
    if channels <= 1 {
        for (out, sample) in mono_buf.iter_mut().zip(data.iter()) {
            *out = convert(*sample);
        }
    } else {
        for (f, out) in mono_buf.iter_mut().enumerate() {
            let base = f * channels;
            let mut sum = 0.0f32;
            for c in 0..channels {
                sum += convert(data[base + c]);
            }
            *out = sum / channels as f32;
        }
    }

    let written = producer.push_slice(mono_buf);
    if written < mono_buf.len() {
        let count = dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if count % DROP_LOG_EVERY == 1 {
            warn!(count, "capture ring full; dropping chunk");
        }
    }
}

/// Consumer loop: drain the ring, resample to the model rate, assemble
/// fixed-size frames, deliver to the sink.
fn run_consumer<F>(
    config: CaptureConfig,
    device_rate: u32,
    mut consumer: AudioConsumer,
    mut sink: F,
    running: &Arc<AtomicBool>,
    shutdown: &Arc<AtomicBool>,
) where
    F: FnMut(&[f32]),
{
    let mut resampler = resample::Resampler::new(device_rate, config.model_sample_rate);

    // 20 ms of device-rate audio per drain.
    let drain_chunk = (device_rate as usize / 50).max(160);
    let mut raw = vec![0.0f32; drain_chunk];
    let mut pending: Vec<f32> = Vec::with_capacity(config.frame_samples * 2);
    let mut frame = vec![0.0f32; config.frame_samples];

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if !running.load(Ordering::SeqCst) {
            std::thread::sleep(PAUSED_SLEEP);
            continue;
        }

        let n = consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(EMPTY_SLEEP);
            continue;
        }

        let converted = resampler.process(&raw[..n]);
        pending.extend_from_slice(&converted);

        while pending.len() >= config.frame_samples {
            frame.copy_from_slice(&pending[..config.frame_samples]);
            pending.drain(..config.frame_samples);
            sink(&frame);
        }
    }

    debug!("capture consumer exited");
}
