//! Playback engine: lock-free ring into the output device callback.
//!
//! # Design constraints
//!
//! The output callback mirrors the capture callback's rules: no locks, no
//! I/O, no blocking. It fills each block from the SPSC ring and substitutes
//! 0.0 for any sample it cannot supply, so the device never stalls. The
//! interrupt flag is checked once per block; when raised (always mode) the
//! callback drains the ring — tail catches up to head — and in-flight audio
//! is gone within one callback period.
//!
//! The device's native rate is queried once at construction; every frame is
//! resampled from the synthesizer rate through the same polyphase path the
//! capture side uses.
//!
//! `cpal::Stream` is `!Send`, so the stream lives on a dedicated playback
//! thread for the engine's lifetime; a sync mpsc channel hands the ring
//! producer and negotiated rate back to the constructor.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, StreamConfig,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::resample::Resampler,
    buffering::{chunk::AudioFrame, create_playback_ring, AudioConsumer, AudioProducer, Consumer, Observer, Producer},
    error::{ColloquyError, Result},
    interrupt::InterruptController,
    worker::{join_with_timeout, JOIN_TIMEOUT},
};

/// Playback configuration.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Device buffer period in milliseconds. 0 selects the 100 ms default,
    /// generous enough for Bluetooth output; wired devices can run at 20.
    pub buffer_ms: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { buffer_ms: 0 }
    }
}

/// Default buffer period applied when `buffer_ms` is 0.
const DEFAULT_BUFFER_MS: u32 = 100;

/// Extra wall-clock allowance on top of a frame's duration before `play`
/// gives up waiting for the callback.
const PLAY_SAFETY_MARGIN: Duration = Duration::from_secs(2);

/// Poll interval while waiting for the callback to drain a frame.
const PLAY_POLL: Duration = Duration::from_millis(5);

/// How one `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every enqueued sample was consumed by the device callback.
    Completed,
    /// The interrupt flag pre-empted playback; the ring was drained.
    Interrupted,
    /// The safety ceiling lapsed before the ring emptied.
    TimedOut,
}

/// Destination for synthesized audio.
///
/// [`PlaybackEngine`] is the device-backed implementation; tests substitute
/// recording fakes.
pub trait PlaybackSink: Send {
    fn play(&mut self, frame: &AudioFrame) -> PlaybackOutcome;
}

/// The device-backed playback engine.
pub struct PlaybackEngine {
    producer: AudioProducer,
    /// Samples enqueued but not yet consumed by the callback.
    pending: Arc<AtomicUsize>,
    /// Samples dropped at enqueue because the ring was full.
    dropped: Arc<AtomicUsize>,
    ctrl: Arc<InterruptController>,
    /// Whether the callback and `play` consult the interrupt flag.
    /// False in wait mode, where the microphone gates playback instead.
    heed_interrupt: bool,
    shutdown: Arc<AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
    device_rate: u32,
    /// Cached converter keyed by the last frame's source rate.
    resampler: Option<(u32, Resampler)>,
}

impl PlaybackEngine {
    /// Open the default output device.
    ///
    /// # Errors
    /// Device-open failure is fatal and propagates to the caller.
    pub fn new(
        config: PlaybackConfig,
        ctrl: Arc<InterruptController>,
        heed_interrupt: bool,
    ) -> Result<Self> {
        let pending = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<(u32, AudioProducer)>>();

        let thread_pending = Arc::clone(&pending);
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_ctrl = Arc::clone(&ctrl);
        let buffer_ms = if config.buffer_ms == 0 {
            DEFAULT_BUFFER_MS
        } else {
            config.buffer_ms
        };

        let join = std::thread::Builder::new()
            .name("playback".into())
            .spawn(move || {
                let opened = open_output_stream(
                    buffer_ms,
                    thread_ctrl,
                    heed_interrupt,
                    thread_pending,
                );
                let stream = match opened {
                    Ok((stream, rate, producer)) => {
                        let _ = open_tx.send(Ok((rate, producer)));
                        stream
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };

                while !thread_shutdown.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                // Stream drops here, releasing the device on its own thread.
                drop(stream);
            })?;

        match open_rx.recv() {
            Ok(Ok((device_rate, producer))) => {
                info!(device_rate, buffer_ms, "playback started");
                Ok(Self {
                    producer,
                    pending,
                    dropped: Arc::new(AtomicUsize::new(0)),
                    ctrl,
                    heed_interrupt,
                    shutdown,
                    join: Some(join),
                    device_rate,
                    resampler: None,
                })
            }
            Ok(Err(e)) => {
                shutdown.store(true, Ordering::SeqCst);
                join_with_timeout(join, JOIN_TIMEOUT, "playback");
                Err(e)
            }
            Err(_) => {
                shutdown.store(true, Ordering::SeqCst);
                Err(ColloquyError::AudioStream(
                    "playback thread died before confirming device open".into(),
                ))
            }
        }
    }

    /// Native rate of the output device.
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Samples dropped at enqueue so far.
    pub fn dropped_samples(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Raise the interrupt flag; the callback drains the ring within one
    /// block.
    pub fn interrupt(&self) {
        self.ctrl.raise();
    }

    /// Stop the stream and release the device.
    pub fn close(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.join.take() {
            join_with_timeout(handle, JOIN_TIMEOUT, "playback");
        }
        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            info!(dropped, "playback closed with dropped samples");
        }
    }

    fn converter_for(&mut self, source_rate: u32) -> &mut Resampler {
        let stale = !matches!(&self.resampler, Some((rate, _)) if *rate == source_rate);
        if stale {
            self.resampler = Some((source_rate, Resampler::new(source_rate, self.device_rate)));
        }
        &mut self.resampler.as_mut().expect("converter just installed").1
    }
}

impl PlaybackSink for PlaybackEngine {
    /// Enqueue one frame and block until it is consumed, the interrupt flag
    /// pre-empts it (always mode), or the safety ceiling lapses.
    ///
    /// Ring overflow at enqueue drops the excess samples and counts them;
    /// bounded memory beats perfect audio here.
    fn play(&mut self, frame: &AudioFrame) -> PlaybackOutcome {
        if frame.is_empty() {
            return PlaybackOutcome::Completed;
        }

        let device_rate = self.device_rate;
        let converted = self.converter_for(frame.sample_rate).process(&frame.samples);

        let pushed = self.producer.push_slice(&converted);
        if pushed < converted.len() {
            let excess = converted.len() - pushed;
            let total = self.dropped.fetch_add(excess, Ordering::Relaxed) + excess;
            warn!(excess, total, "playback ring full; dropping samples");
        }
        self.pending.fetch_add(pushed, Ordering::SeqCst);

        let duration = Duration::from_secs_f64(pushed as f64 / device_rate as f64);
        let deadline = Instant::now() + duration + PLAY_SAFETY_MARGIN;

        loop {
            if self.heed_interrupt && self.ctrl.is_raised() {
                debug!("playback interrupted");
                return PlaybackOutcome::Interrupted;
            }
            if self.pending.load(Ordering::SeqCst) == 0 {
                return PlaybackOutcome::Completed;
            }
            if Instant::now() >= deadline {
                warn!(?duration, "playback did not drain before the safety ceiling");
                return PlaybackOutcome::TimedOut;
            }
            std::thread::sleep(PLAY_POLL);
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open the default output device and wire its callback to a fresh ring.
fn open_output_stream(
    buffer_ms: u32,
    ctrl: Arc<InterruptController>,
    heed_interrupt: bool,
    pending: Arc<AtomicUsize>,
) -> Result<(cpal::Stream, u32, AudioProducer)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(ColloquyError::NoDefaultOutputDevice)?;
    let name = device.name().unwrap_or_else(|_| "unknown".into());

    let supported = device
        .default_output_config()
        .map_err(|e| ColloquyError::AudioDevice(e.to_string()))?;
    let device_rate = supported.sample_rate().0;
    let channels = supported.channels();

    info!(
        device = name.as_str(),
        device_rate,
        channels,
        "opening output device"
    );

    let frames_per_period = device_rate * buffer_ms / 1000;
    let mut attempt = |buffer_size: cpal::BufferSize| -> Result<(cpal::Stream, AudioProducer)> {
        let (producer, consumer) = create_playback_ring(device_rate);
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(device_rate),
            buffer_size,
        };
        let stream = build_output(
            &device,
            &config,
            supported.sample_format(),
            channels,
            consumer,
            Arc::clone(&ctrl),
            heed_interrupt,
            Arc::clone(&pending),
        )?;
        stream
            .play()
            .map_err(|e| ColloquyError::AudioStream(e.to_string()))?;
        Ok((stream, producer))
    };

    let (stream, producer) = match attempt(cpal::BufferSize::Fixed(frames_per_period)) {
        Ok(parts) => parts,
        Err(e) => {
            // Some backends reject fixed buffer sizes; retry with default.
            warn!(error = %e, "fixed buffer size rejected; retrying with device default");
            attempt(cpal::BufferSize::Default)?
        }
    };

    Ok((stream, device_rate, producer))
}

/// Build the output stream for the negotiated sample format.
#[allow(clippy::too_many_arguments)]
fn build_output(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    channels: u16,
    mut consumer: AudioConsumer,
    ctrl: Arc<InterruptController>,
    heed_interrupt: bool,
    pending: Arc<AtomicUsize>,
) -> Result<cpal::Stream> {
    let ch = channels as usize;
    let mut mono_buf: Vec<f32> = Vec::new();

    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _info| {
                fill_block(
                    data,
                    ch,
                    &mut consumer,
                    &mut mono_buf,
                    &ctrl,
                    heed_interrupt,
                    &pending,
                    |s| s,
                );
            },
            |err| error!("audio output stream error: {err}"),
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            config,
            move |data: &mut [i16], _info| {
                fill_block(
                    data,
                    ch,
                    &mut consumer,
                    &mut mono_buf,
                    &ctrl,
                    heed_interrupt,
                    &pending,
                    |s| (s.clamp(-1.0, 1.0) * 32_767.0) as i16,
                );
            },
            |err| error!("audio output stream error: {err}"),
            None,
        ),
        SampleFormat::U8 => device.build_output_stream(
            config,
            move |data: &mut [u8], _info| {
                fill_block(
                    data,
                    ch,
                    &mut consumer,
                    &mut mono_buf,
                    &ctrl,
                    heed_interrupt,
                    &pending,
                    |s| ((s.clamp(-1.0, 1.0) * 127.0) + 128.0) as u8,
                );
            },
            |err| error!("audio output stream error: {err}"),
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

/// Fill one output block from the ring, spreading mono across channels and
/// zero-filling any shortfall. Checked first: an interrupt drains the ring.
#[allow(clippy::too_many_arguments)]
fn fill_block<T: Copy>(
    data: &mut [T],
    channels: usize,
    consumer: &mut AudioConsumer,
    mono_buf: &mut Vec<f32>,
    ctrl: &InterruptController,
    heed_interrupt: bool,
    pending: &AtomicUsize,
    convert: impl Fn(f32) -> T,
) {
    if heed_interrupt && ctrl.is_raised() {
        let queued = consumer.occupied_len();
        let _ = consumer.skip(queued);
        pending.store(0, Ordering::SeqCst);
    }

    let frames = data.len() / channels.max(1);
    mono_buf.resize(frames, 0.0);
    let supplied = consumer.pop_slice(&mut mono_buf[..frames]);
    for tail in mono_buf[supplied..frames].iter_mut() {
        *tail = 0.0;
    }

    for (f, chunk) in data.chunks_mut(channels.max(1)).enumerate() {
        let value = convert(mono_buf[f]);
        for out in chunk.iter_mut() {
            *out = value;
        }
    }

    if supplied > 0 {
        let _ = pending.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| {
            Some(p.saturating_sub(supplied))
        });
    }
}
