//! Immutable audio session configuration

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_CHANNELS: u16 = 1;
pub const DEFAULT_BLOCK_SIZE: usize = 1024;
/// RMS level at or above which a block counts as speech
pub const DEFAULT_VOLUME_THRESHOLD: f32 = 0.03;
pub const DEFAULT_SPEECH_GAIN: f32 = 1.5;
pub const DEFAULT_BACKGROUND_GAIN: f32 = 0.1;
/// Peak level the finished capture is normalised to
pub const DEFAULT_HEADROOM: f32 = 0.9;
pub const DEFAULT_HIGH_PASS_HZ: f32 = 70.0;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Error when an audio configuration value is out of range
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid audio setting '{field}': {message}")]
pub struct InvalidAudioConfig {
    pub field: &'static str,
    pub message: String,
}

impl InvalidAudioConfig {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Configuration snapshot for one capture or playback session.
///
/// Built once through [`AudioConfigBuilder`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    sample_rate: u32,
    channels: u16,
    block_size: usize,
    device: Option<String>,
    volume_threshold: f32,
    min_speech_duration: Duration,
    silence_duration: Duration,
    patience: Duration,
    max_duration: Duration,
    speech_gain: f32,
    background_gain: f32,
    headroom: f32,
    high_pass_hz: Option<f32>,
    channel_capacity: usize,
}

impl AudioConfig {
    pub fn builder() -> AudioConfigBuilder {
        AudioConfigBuilder::default()
    }

    /// Sample rate of the encoded output, and the rate requested from the device
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count requested from the device. Captured audio is mixed to mono.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples per block handed to the meter and the detector
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Input device name, `None` for the host default
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn volume_threshold(&self) -> f32 {
        self.volume_threshold
    }

    pub fn min_speech_duration(&self) -> Duration {
        self.min_speech_duration
    }

    pub fn silence_duration(&self) -> Duration {
        self.silence_duration
    }

    /// Minimum session age before an utterance may be declared complete
    pub fn patience(&self) -> Duration {
        self.patience
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn speech_gain(&self) -> f32 {
        self.speech_gain
    }

    pub fn background_gain(&self) -> f32 {
        self.background_gain
    }

    pub fn headroom(&self) -> f32 {
        self.headroom
    }

    pub fn high_pass_hz(&self) -> Option<f32> {
        self.high_pass_hz
    }

    /// Capacity of the bounded channel between the device callback and the capture task
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Nominal duration of one block at the configured rate
    pub fn block_duration(&self) -> Duration {
        Duration::from_nanos(self.block_size as u64 * 1_000_000_000 / self.sample_rate as u64)
    }

    fn validate(&self) -> Result<(), InvalidAudioConfig> {
        if self.sample_rate == 0 {
            return Err(InvalidAudioConfig::new("sample_rate", "must be greater than zero"));
        }
        if self.channels == 0 {
            return Err(InvalidAudioConfig::new("channels", "must be greater than zero"));
        }
        if self.block_size == 0 {
            return Err(InvalidAudioConfig::new("block_size", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.volume_threshold) {
            return Err(InvalidAudioConfig::new(
                "volume_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.max_duration.is_zero() {
            return Err(InvalidAudioConfig::new("max_duration", "must be greater than zero"));
        }
        if !self.speech_gain.is_finite() || self.speech_gain <= 0.0 {
            return Err(InvalidAudioConfig::new("speech_gain", "must be a positive number"));
        }
        if !self.background_gain.is_finite() || self.background_gain < 0.0 {
            return Err(InvalidAudioConfig::new(
                "background_gain",
                "must be zero or a positive number",
            ));
        }
        if self.background_gain >= self.speech_gain {
            return Err(InvalidAudioConfig::new(
                "background_gain",
                "must be lower than speech_gain",
            ));
        }
        if !(self.headroom > 0.0 && self.headroom <= 1.0) {
            return Err(InvalidAudioConfig::new("headroom", "must be in (0.0, 1.0]"));
        }
        if let Some(hz) = self.high_pass_hz {
            let nyquist = self.sample_rate as f32 / 2.0;
            if !(hz > 0.0 && hz < nyquist) {
                return Err(InvalidAudioConfig::new(
                    "high_pass_hz",
                    format!("must be between 0 and {} Hz", nyquist),
                ));
            }
        }
        if self.channel_capacity == 0 {
            return Err(InvalidAudioConfig::new(
                "channel_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            block_size: DEFAULT_BLOCK_SIZE,
            device: None,
            volume_threshold: DEFAULT_VOLUME_THRESHOLD,
            min_speech_duration: crate::domain::Duration::default_min_speech().as_std(),
            silence_duration: crate::domain::Duration::default_silence().as_std(),
            patience: crate::domain::Duration::default_patience().as_std(),
            max_duration: crate::domain::Duration::default_max_duration().as_std(),
            speech_gain: DEFAULT_SPEECH_GAIN,
            background_gain: DEFAULT_BACKGROUND_GAIN,
            headroom: DEFAULT_HEADROOM,
            high_pass_hz: Some(DEFAULT_HIGH_PASS_HZ),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Builder for [`AudioConfig`]; `build` validates the whole snapshot.
#[derive(Debug, Clone, Default)]
pub struct AudioConfigBuilder {
    config: AudioConfig,
}

impl AudioConfigBuilder {
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.config.channels = channels;
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.config.block_size = block_size;
        self
    }

    pub fn device(mut self, device: Option<String>) -> Self {
        self.config.device = device.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn volume_threshold(mut self, threshold: f32) -> Self {
        self.config.volume_threshold = threshold;
        self
    }

    pub fn min_speech_duration(mut self, duration: Duration) -> Self {
        self.config.min_speech_duration = duration;
        self
    }

    pub fn silence_duration(mut self, duration: Duration) -> Self {
        self.config.silence_duration = duration;
        self
    }

    pub fn patience(mut self, duration: Duration) -> Self {
        self.config.patience = duration;
        self
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.config.max_duration = duration;
        self
    }

    pub fn speech_gain(mut self, gain: f32) -> Self {
        self.config.speech_gain = gain;
        self
    }

    pub fn background_gain(mut self, gain: f32) -> Self {
        self.config.background_gain = gain;
        self
    }

    pub fn headroom(mut self, headroom: f32) -> Self {
        self.config.headroom = headroom;
        self
    }

    pub fn high_pass_hz(mut self, hz: Option<f32>) -> Self {
        self.config.high_pass_hz = hz;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<AudioConfig, InvalidAudioConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AudioConfig::builder().build().unwrap();
        assert_eq!(config.sample_rate(), 16_000);
        assert_eq!(config.channels(), 1);
        assert_eq!(config.block_size(), 1024);
        assert_eq!(config.silence_duration(), Duration::from_secs(2));
        assert_eq!(config.min_speech_duration(), Duration::from_secs(1));
        assert!(config.device().is_none());
    }

    #[test]
    fn block_duration_at_rate() {
        let config = AudioConfig::builder()
            .sample_rate(16_000)
            .block_size(1600)
            .build()
            .unwrap();
        assert_eq!(config.block_duration(), Duration::from_millis(100));
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let err = AudioConfig::builder().sample_rate(0).build().unwrap_err();
        assert_eq!(err.field, "sample_rate");
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let err = AudioConfig::builder()
            .volume_threshold(1.5)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "volume_threshold");
    }

    #[test]
    fn background_gain_must_attenuate_relative_to_speech() {
        let err = AudioConfig::builder()
            .speech_gain(1.0)
            .background_gain(1.0)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "background_gain");

        assert!(AudioConfig::builder()
            .speech_gain(2.0)
            .background_gain(0.5)
            .build()
            .is_ok());
    }

    #[test]
    fn rejects_high_pass_above_nyquist() {
        let err = AudioConfig::builder()
            .sample_rate(16_000)
            .high_pass_hz(Some(9_000.0))
            .build()
            .unwrap_err();
        assert_eq!(err.field, "high_pass_hz");
        assert!(AudioConfig::builder().high_pass_hz(None).build().is_ok());
    }

    #[test]
    fn blank_device_name_means_default() {
        let config = AudioConfig::builder()
            .device(Some("  ".to_string()))
            .build()
            .unwrap();
        assert!(config.device().is_none());
    }
}
