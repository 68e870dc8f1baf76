//! Audio sample-rate conversion.
//!
//! ## Design
//!
//! `cpal` captures at the device's native rate (commonly 48 kHz); the
//! recognizer requires 16 kHz mono f32, and the playback path converts the
//! synthesizer's rate (typically 24 kHz) to the output device's native rate.
//! Both directions share this module.
//!
//! Three modes, selected once from the rate pair:
//! - **Down-sampling** — 64-tap windowed-sinc FIR polyphase with the cutoff
//!   at the output Nyquist. A 64-sample input history is preserved across
//!   calls so the filter window never sees a seam. Aliasing on the capture
//!   path corrupts voice-activity decisions, hence the real filter.
//! - **Up-sampling** — linear interpolation with a one-sample carry.
//! - **Identity** — borrowed passthrough, no allocation.
//!
//! Cumulative output length for input length N at ratio r is ⌊N·r⌋ ± 1.

use std::borrow::Cow;
use std::f64::consts::PI;

/// Filter length for the down-sampling FIR.
const TAPS: usize = 64;
/// Half the filter span; the kernel covers offsets in (−HALF, HALF].
const HALF: usize = TAPS / 2;

/// Converts f32 mono audio from one fixed sample rate to another.
#[derive(Debug)]
pub struct Resampler {
    mode: Mode,
}

#[derive(Debug)]
enum Mode {
    Identity,
    Fir(FirDecimator),
    Linear(LinearInterpolator),
}

impl Resampler {
    /// Create a converter from `from_rate` to `to_rate` (both in Hz).
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let mode = if from_rate == to_rate {
            Mode::Identity
        } else if from_rate > to_rate {
            Mode::Fir(FirDecimator::new(from_rate, to_rate))
        } else {
            Mode::Linear(LinearInterpolator::new(from_rate, to_rate))
        };
        Self { mode }
    }

    /// Process a block of samples, returning the converted output.
    ///
    /// In identity mode the input slice is returned borrowed, untouched.
    pub fn process<'a>(&mut self, input: &'a [f32]) -> Cow<'a, [f32]> {
        match &mut self.mode {
            Mode::Identity => Cow::Borrowed(input),
            Mode::Fir(fir) => Cow::Owned(fir.process(input)),
            Mode::Linear(lin) => Cow::Owned(lin.process(input)),
        }
    }

    /// Returns `true` when the rates match and `process` is a passthrough.
    pub fn is_identity(&self) -> bool {
        matches!(self.mode, Mode::Identity)
    }
}

/// Windowed-sinc polyphase decimator.
///
/// Holds the last [`TAPS`] input samples so consecutive calls behave as one
/// continuous stream. The fractional output position is carried in `pos`.
#[derive(Debug)]
struct FirDecimator {
    /// Input samples advanced per output sample (> 1 for decimation).
    step: f64,
    /// Cutoff in cycles per input sample: the output Nyquist.
    cutoff: f64,
    /// Last `TAPS` input samples from the previous call (zeros at start).
    history: Vec<f32>,
    /// Position of the next output sample, relative to the start of the
    /// current `history ++ input` buffer.
    pos: f64,
}

impl FirDecimator {
    fn new(from_rate: u32, to_rate: u32) -> Self {
        debug_assert!(from_rate > to_rate);
        Self {
            step: from_rate as f64 / to_rate as f64,
            cutoff: (to_rate as f64 / 2.0) / from_rate as f64,
            history: vec![0.0; TAPS],
            // Center the first window inside the zeroed history so output
            // length tracks input length from the first call.
            pos: (HALF - 1) as f64,
        }
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let mut ext = Vec::with_capacity(TAPS + input.len());
        ext.extend_from_slice(&self.history);
        ext.extend_from_slice(input);

        // The window around output position p spans input indices
        // floor(p)-HALF+1 ..= floor(p)+HALF; emit while the right edge is
        // inside the buffer.
        let limit = ext.len() as f64 - HALF as f64;
        let mut out = Vec::with_capacity((input.len() as f64 / self.step) as usize + 2);
        while self.pos < limit {
            out.push(self.interpolate(&ext));
            self.pos += self.step;
        }

        let consumed = ext.len() - TAPS;
        self.pos -= consumed as f64;
        self.history.copy_from_slice(&ext[consumed..]);
        out
    }

    /// Evaluate the filter at the current fractional position.
    fn interpolate(&self, ext: &[f32]) -> f32 {
        let base = self.pos.floor();
        let frac = self.pos - base;
        let base = base as isize;

        let mut acc = 0.0f64;
        let mut norm = 0.0f64;
        for j in (1 - HALF as isize)..=(HALF as isize) {
            let offset = j as f64 - frac;
            // Hann window over ±HALF input samples.
            let window = 0.5 * (1.0 + (PI * offset / HALF as f64).cos());
            let coeff = sinc(2.0 * self.cutoff * offset) * window;
            norm += coeff;
            acc += coeff * f64::from(ext[(base + j) as usize]);
        }
        // Per-position normalization keeps DC gain at unity for every
        // fractional phase.
        (acc / norm) as f32
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Linear interpolator for up-sampling.
///
/// Carries the final input sample of each call so the first output of the
/// next call interpolates across the seam.
#[derive(Debug)]
struct LinearInterpolator {
    /// Input samples advanced per output sample (< 1 for interpolation).
    step: f64,
    /// Last input sample of the previous call.
    carry: Option<f32>,
    /// Fractional position past the carry sample.
    frac: f64,
}

impl LinearInterpolator {
    fn new(from_rate: u32, to_rate: u32) -> Self {
        debug_assert!(from_rate < to_rate);
        Self {
            step: from_rate as f64 / to_rate as f64,
            carry: None,
            frac: 0.0,
        }
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if input.is_empty() {
            return Vec::new();
        }

        // Virtual buffer: [carry] ++ input.
        let lead = usize::from(self.carry.is_some());
        let carried = self.carry.unwrap_or(0.0);
        let len = input.len() + lead;
        let get = move |i: usize| -> f32 {
            if lead == 1 && i == 0 {
                carried
            } else {
                input[i - lead]
            }
        };

        let mut out = Vec::with_capacity((input.len() as f64 / self.step) as usize + 2);
        let mut pos = self.frac;
        let last = (len - 1) as f64;
        while pos <= last {
            let i = pos.floor() as usize;
            let frac = (pos - i as f64) as f32;
            let s0 = get(i);
            let s1 = if i + 1 < len { get(i + 1) } else { s0 };
            out.push(s0 + frac * (s1 - s0));
            pos += self.step;
        }

        self.carry = Some(get(len - 1));
        self.frac = pos - last;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cumulative_len(rs: &mut Resampler, blocks: &[&[f32]]) -> usize {
        blocks.iter().map(|b| rs.process(b).len()).sum()
    }

    #[test]
    fn identity_is_borrowed_passthrough() {
        let mut rs = Resampler::new(16_000, 16_000);
        assert!(rs.is_identity());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        let out = rs.process(&samples);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.as_ref(), samples.as_slice());
    }

    #[test]
    fn identity_twice_equals_once() {
        let samples: Vec<f32> = (0..256).map(|i| (i as f32 * 0.1).sin()).collect();
        let mut a = Resampler::new(48_000, 48_000);
        let once = a.process(&samples).into_owned();
        let twice = a.process(&once).into_owned();
        assert_eq!(once, twice);
    }

    #[test]
    fn downsample_48k_to_16k_tracks_a_third_of_input() {
        let mut rs = Resampler::new(48_000, 16_000);
        let block = vec![0.0f32; 960];
        let total = cumulative_len(&mut rs, &[&block, &block, &block, &block]);
        // 4 × 960 input at ratio 1/3 → 1280 ± 1.
        assert!((total as isize - 1280).abs() <= 1, "total={total}");
    }

    #[test]
    fn downsample_per_call_length_within_one() {
        let mut rs = Resampler::new(44_100, 16_000);
        let block = vec![0.0f32; 441];
        let mut produced = 0usize;
        for call in 1..=20 {
            produced += rs.process(&block).len();
            let expected = (call * 441) as f64 * (16_000.0 / 44_100.0);
            assert!(
                (produced as f64 - expected).abs() <= 1.5,
                "call {call}: produced={produced} expected≈{expected:.1}"
            );
        }
    }

    #[test]
    fn upsample_16k_to_24k_length() {
        let mut rs = Resampler::new(16_000, 24_000);
        let block = vec![0.0f32; 960];
        let mut produced = 0usize;
        for call in 1..=8 {
            produced += rs.process(&block).len();
            let expected = (call * 960) as f64 * 1.5;
            assert!(
                (produced as f64 - expected).abs() <= 1.5,
                "call {call}: produced={produced} expected≈{expected:.1}"
            );
        }
    }

    #[test]
    fn downsample_preserves_dc_across_call_seams() {
        let mut rs = Resampler::new(48_000, 16_000);
        let block = vec![0.5f32; 960];
        // First call includes the zeroed-history ramp-in; discard it.
        rs.process(&block);
        for _ in 0..4 {
            for &s in rs.process(&block).iter() {
                assert_abs_diff_eq!(s, 0.5, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn upsample_interpolates_across_call_seams() {
        let mut rs = Resampler::new(16_000, 32_000);
        // A linear ramp stays a linear ramp under linear interpolation,
        // including at the block boundary carried by `carry`.
        let a: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let b: Vec<f32> = (8..16).map(|i| i as f32).collect();
        let mut out = rs.process(&a).into_owned();
        out.extend_from_slice(&rs.process(&b));
        for pair in out.windows(2) {
            assert_abs_diff_eq!(pair[1] - pair[0], 0.5, epsilon = 1e-4);
        }
    }

    #[test]
    fn tone_survives_downsampling_without_aliasing() {
        // 1 s of 440 Hz at 48 kHz → 16 kHz. The tone must stay at 440 Hz:
        // ≈880 zero crossings per second, and no spurious energy spikes.
        let mut rs = Resampler::new(48_000, 16_000);
        let tone: Vec<f32> = (0..48_000)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48_000.0).sin())
            .collect();

        let mut out = Vec::new();
        for block in tone.chunks(960) {
            out.extend_from_slice(&rs.process(block));
        }
        assert!((out.len() as isize - 16_000).abs() <= 1, "len={}", out.len());

        let crossings = out
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        assert!(
            (crossings as f64 - 880.0).abs() < 20.0,
            "zero crossings={crossings}"
        );

        // Amplitude preserved within the passband.
        let rms = (out.iter().map(|s| s * s).sum::<f32>() / out.len() as f32).sqrt();
        assert_abs_diff_eq!(rms, std::f32::consts::FRAC_1_SQRT_2, epsilon = 0.05);
    }
}
