//! Lock-free SPSC ring buffers for audio samples.
//!
//! Uses `ringbuf::HeapRb<f32>` which provides a wait-free `push_slice`
//! safe to call from the real-time audio callbacks.
//!
//! Two rings exist in the pipeline:
//! - **capture ring** — producer is the input callback, consumer is the
//!   capture consumer thread. Sized for ≈4 s at the device rate.
//! - **playback ring** — producer is the synth worker, consumer is the
//!   output callback. Sized for ≈11 s at the device rate.
//!
//! A push that does not fit is dropped and counted by the producer; the
//! playback consumer substitutes silence when its ring underruns.

pub mod chunk;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Type alias for the producer half of an audio ring.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Type alias for the consumer half of an audio ring.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Seconds of audio the capture ring can hold before drops begin.
pub const CAPTURE_RING_SECS: usize = 4;

/// Seconds of audio the playback ring can hold before enqueue drops excess.
pub const PLAYBACK_RING_SECS: usize = 11;

/// Create a capture ring sized for [`CAPTURE_RING_SECS`] at `sample_rate`.
pub fn create_capture_ring(sample_rate: u32) -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(sample_rate as usize * CAPTURE_RING_SECS).split()
}

/// Create a playback ring sized for [`PLAYBACK_RING_SECS`] at `sample_rate`.
pub fn create_playback_ring(sample_rate: u32) -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(sample_rate as usize * PLAYBACK_RING_SECS).split()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_ring_capacity_matches_rate() {
        let (producer, _consumer) = create_capture_ring(16_000);
        assert_eq!(producer.capacity().get(), 64_000);
    }

    #[test]
    fn push_beyond_capacity_reports_shortfall() {
        let (mut producer, mut consumer) = create_capture_ring(1);
        // Capacity is CAPTURE_RING_SECS samples at 1 Hz.
        let written = producer.push_slice(&[0.1; 16]);
        assert_eq!(written, CAPTURE_RING_SECS);

        let mut buf = [0.0f32; 16];
        let read = consumer.pop_slice(&mut buf);
        assert_eq!(read, CAPTURE_RING_SECS);
    }

    #[test]
    fn consumer_sees_samples_in_order() {
        let (mut producer, mut consumer) = create_playback_ring(1);
        producer.push_slice(&[1.0, 2.0, 3.0]);
        let mut buf = [0.0f32; 3];
        consumer.pop_slice(&mut buf);
        assert_eq!(buf, [1.0, 2.0, 3.0]);
    }
}
