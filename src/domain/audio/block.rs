//! Audio block and encoded buffer value objects

use std::time::{Duration, Instant};

/// A block of mono samples as delivered by the input device.
///
/// Samples are normalised to [-1.0, 1.0]. `captured_at` is the instant the
/// block arrived from the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<f32>,
    sample_rate: u32,
    captured_at: Instant,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>, sample_rate: u32, captured_at: Instant) -> Self {
        Self {
            samples,
            sample_rate,
            captured_at,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration of the block at its sample rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.samples.len() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }
}

/// Value object holding audio in the portable container format (16-bit PCM WAV).
/// This is the only form of audio that crosses the core's boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    data: Vec<u8>,
}

impl EncodedAudio {
    /// MIME type of the container
    pub const MIME_TYPE: &'static str = "audio/wav";

    /// File extension of the container
    pub const EXTENSION: &'static str = "wav";

    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get human-readable size
    pub fn human_readable_size(&self) -> String {
        let bytes = self.size_bytes();
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        }
    }
}
