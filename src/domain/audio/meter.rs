//! Volume metering

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::block::AudioBlock;

/// Computes the energy level of a block as its root-mean-square.
///
/// RMS is independent of block length for a uniform signal, so levels from
/// differently sized blocks compare directly against one threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeMeter;

impl VolumeMeter {
    pub fn level(block: &AudioBlock) -> f32 {
        Self::level_of(block.samples())
    }

    pub fn level_of(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let energy: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>()
            / samples.len() as f64;
        energy.sqrt() as f32
    }
}

/// Most recent block level and speech classification, shared lock-free with a UI.
#[derive(Clone, Debug, Default)]
pub struct LiveMeter {
    level_bits: Arc<AtomicU32>,
    speaking: Arc<AtomicBool>,
}

impl LiveMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, level: f32, speaking: bool) {
        self.level_bits.store(level.to_bits(), Ordering::Relaxed);
        self.speaking.store(speaking, Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    /// Whether the last block was classified as speech
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }
}
