//! Application configuration value object

use serde::{Deserialize, Serialize};

use crate::domain::audio::{config as audio_defaults, AudioConfig};
use crate::domain::error::ConfigError;
use crate::domain::recording::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TRANSCRIPTION_MODELS: [&str; 2] = ["gpt-4o-transcribe", "whisper-1"];
pub const DEFAULT_SYNTHESIS_MODELS: [&str; 2] = ["gpt-4o-mini-tts", "tts-1"];
pub const DEFAULT_VOICE: &str = "onyx";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_SPEED: f32 = 0.9;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// `[audio]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSection {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub block_size: Option<usize>,
    pub device: Option<String>,
    pub volume_threshold: Option<f32>,
    pub min_speech: Option<String>,
    pub silence: Option<String>,
    pub patience: Option<String>,
    pub max_duration: Option<String>,
    pub speech_gain: Option<f32>,
    pub background_gain: Option<f32>,
    pub headroom: Option<f32>,
    /// Cutoff of the post-capture high-pass filter; 0 disables it
    pub high_pass_hz: Option<f32>,
}

impl AudioSection {
    fn merge(self, other: Self) -> Self {
        Self {
            sample_rate: other.sample_rate.or(self.sample_rate),
            channels: other.channels.or(self.channels),
            block_size: other.block_size.or(self.block_size),
            device: other.device.or(self.device),
            volume_threshold: other.volume_threshold.or(self.volume_threshold),
            min_speech: other.min_speech.or(self.min_speech),
            silence: other.silence.or(self.silence),
            patience: other.patience.or(self.patience),
            max_duration: other.max_duration.or(self.max_duration),
            speech_gain: other.speech_gain.or(self.speech_gain),
            background_gain: other.background_gain.or(self.background_gain),
            headroom: other.headroom.or(self.headroom),
            high_pass_hz: other.high_pass_hz.or(self.high_pass_hz),
        }
    }
}

/// `[speech]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechSection {
    /// Transcription models, tried in order
    pub transcription_models: Option<Vec<String>>,
    /// Speech synthesis models, tried in order
    pub synthesis_models: Option<Vec<String>>,
    pub voice: Option<String>,
    pub language: Option<String>,
    pub speed: Option<f32>,
    pub temperature: Option<f32>,
}

impl SpeechSection {
    fn merge(self, other: Self) -> Self {
        Self {
            transcription_models: other.transcription_models.or(self.transcription_models),
            synthesis_models: other.synthesis_models.or(self.synthesis_models),
            voice: other.voice.or(self.voice),
            language: other.language.or(self.language),
            speed: other.speed.or(self.speed),
            temperature: other.temperature.or(self.temperature),
        }
    }
}

/// Application configuration.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub audio: Option<AudioSection>,
    pub speech: Option<SpeechSection>,
}

impl AppConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        Self {
            api_key: None,
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            audio: Some(AudioSection {
                sample_rate: Some(audio_defaults::DEFAULT_SAMPLE_RATE),
                channels: Some(audio_defaults::DEFAULT_CHANNELS),
                block_size: Some(audio_defaults::DEFAULT_BLOCK_SIZE),
                device: None,
                volume_threshold: Some(audio_defaults::DEFAULT_VOLUME_THRESHOLD),
                min_speech: Some(Duration::default_min_speech().to_string()),
                silence: Some(Duration::default_silence().to_string()),
                patience: Some(Duration::default_patience().to_string()),
                max_duration: Some(Duration::default_max_duration().to_string()),
                speech_gain: Some(audio_defaults::DEFAULT_SPEECH_GAIN),
                background_gain: Some(audio_defaults::DEFAULT_BACKGROUND_GAIN),
                headroom: Some(audio_defaults::DEFAULT_HEADROOM),
                high_pass_hz: Some(audio_defaults::DEFAULT_HIGH_PASS_HZ),
            }),
            speech: Some(SpeechSection {
                transcription_models: Some(to_strings(&DEFAULT_TRANSCRIPTION_MODELS)),
                synthesis_models: Some(to_strings(&DEFAULT_SYNTHESIS_MODELS)),
                voice: Some(DEFAULT_VOICE.to_string()),
                language: Some(DEFAULT_LANGUAGE.to_string()),
                speed: Some(DEFAULT_SPEED),
                temperature: Some(DEFAULT_TEMPERATURE),
            }),
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            api_key: other.api_key.or(self.api_key),
            base_url: other.base_url.or(self.base_url),
            audio: merge_section(self.audio, other.audio, AudioSection::merge),
            speech: merge_section(self.speech, other.speech, SpeechSection::merge),
        }
    }

    /// Build the validated audio snapshot from the `[audio]` section.
    ///
    /// Unset values fall back to the built-in defaults; unparsable or out of
    /// range values are reported rather than replaced.
    pub fn to_audio_config(&self) -> Result<AudioConfig, ConfigError> {
        let section = self.audio.clone().unwrap_or_default();
        let mut builder = AudioConfig::builder().device(section.device);

        if let Some(rate) = section.sample_rate {
            builder = builder.sample_rate(rate);
        }
        if let Some(channels) = section.channels {
            builder = builder.channels(channels);
        }
        if let Some(block_size) = section.block_size {
            builder = builder.block_size(block_size);
        }
        if let Some(threshold) = section.volume_threshold {
            builder = builder.volume_threshold(threshold);
        }
        if let Some(d) = parse_duration("audio.min_speech", section.min_speech.as_deref())? {
            builder = builder.min_speech_duration(d.as_std());
        }
        if let Some(d) = parse_duration("audio.silence", section.silence.as_deref())? {
            builder = builder.silence_duration(d.as_std());
        }
        if let Some(d) = parse_duration("audio.patience", section.patience.as_deref())? {
            builder = builder.patience(d.as_std());
        }
        if let Some(d) = parse_duration("audio.max_duration", section.max_duration.as_deref())? {
            builder = builder.max_duration(d.as_std());
        }
        if let Some(gain) = section.speech_gain {
            builder = builder.speech_gain(gain);
        }
        if let Some(gain) = section.background_gain {
            builder = builder.background_gain(gain);
        }
        if let Some(headroom) = section.headroom {
            builder = builder.headroom(headroom);
        }
        if let Some(hz) = section.high_pass_hz {
            builder = builder.high_pass_hz((hz > 0.0).then_some(hz));
        }

        builder.build().map_err(|e| ConfigError::ValidationError {
            key: format!("audio.{}", e.field),
            message: e.message,
        })
    }

    /// Get base URL, or the public OpenAI endpoint if not set
    pub fn base_url_or_default(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Get transcription models in priority order. An empty list means the default chain.
    pub fn transcription_models_or_default(&self) -> Vec<String> {
        self.speech
            .as_ref()
            .and_then(|s| s.transcription_models.clone())
            .filter(|models| !models.is_empty())
            .unwrap_or_else(|| to_strings(&DEFAULT_TRANSCRIPTION_MODELS))
    }

    /// Get synthesis models in priority order. An empty list means the default chain.
    pub fn synthesis_models_or_default(&self) -> Vec<String> {
        self.speech
            .as_ref()
            .and_then(|s| s.synthesis_models.clone())
            .filter(|models| !models.is_empty())
            .unwrap_or_else(|| to_strings(&DEFAULT_SYNTHESIS_MODELS))
    }

    pub fn voice_or_default(&self) -> &str {
        self.speech
            .as_ref()
            .and_then(|s| s.voice.as_deref())
            .unwrap_or(DEFAULT_VOICE)
    }

    pub fn language_or_default(&self) -> &str {
        self.speech
            .as_ref()
            .and_then(|s| s.language.as_deref())
            .unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn speed_or_default(&self) -> f32 {
        self.speech
            .as_ref()
            .and_then(|s| s.speed)
            .unwrap_or(DEFAULT_SPEED)
    }

    pub fn temperature_or_default(&self) -> f32 {
        self.speech
            .as_ref()
            .and_then(|s| s.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE)
    }
}

fn merge_section<T>(base: Option<T>, other: Option<T>, merge: fn(T, T) -> T) -> Option<T> {
    match (base, other) {
        (None, None) => None,
        (Some(b), None) => Some(b),
        (None, Some(o)) => Some(o),
        (Some(b), Some(o)) => Some(merge(b, o)),
    }
}

fn parse_duration(key: &str, value: Option<&str>) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|s| {
            s.parse::<Duration>()
                .map_err(|e| ConfigError::ValidationError {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        })
        .transpose()
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn defaults_have_expected_values() {
        let config = AppConfig::defaults();
        assert!(config.api_key.is_none());
        assert_eq!(config.base_url_or_default(), DEFAULT_BASE_URL);
        let audio = config.audio.as_ref().unwrap();
        assert_eq!(audio.sample_rate, Some(16_000));
        assert_eq!(audio.silence, Some("2s".to_string()));
        assert_eq!(audio.max_duration, Some("30s".to_string()));
        assert_eq!(
            config.transcription_models_or_default(),
            vec!["gpt-4o-transcribe", "whisper-1"]
        );
        assert_eq!(config.voice_or_default(), "onyx");
    }

    #[test]
    fn defaults_produce_default_audio_config() {
        let audio = AppConfig::defaults().to_audio_config().unwrap();
        assert_eq!(audio, AudioConfig::default());
    }

    #[test]
    fn empty_has_all_none() {
        let config = AppConfig::empty();
        assert!(config.api_key.is_none());
        assert!(config.base_url.is_none());
        assert!(config.audio.is_none());
        assert!(config.speech.is_none());
    }

    #[test]
    fn merge_other_takes_precedence() {
        let base = AppConfig {
            api_key: Some("base_key".to_string()),
            base_url: Some("http://base".to_string()),
            ..Default::default()
        };

        let other = AppConfig {
            api_key: Some("other_key".to_string()),
            base_url: None, // Should not override
            ..Default::default()
        };

        let merged = base.merge(other);

        assert_eq!(merged.api_key, Some("other_key".to_string()));
        assert_eq!(merged.base_url, Some("http://base".to_string()));
    }

    #[test]
    fn merge_sections_field_by_field() {
        let base = AppConfig {
            audio: Some(AudioSection {
                silence: Some("2s".to_string()),
                device: Some("Built-in".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let other = AppConfig {
            audio: Some(AudioSection {
                silence: Some("1500ms".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = base.merge(other);
        let audio = merged.audio.unwrap();
        assert_eq!(audio.silence, Some("1500ms".to_string()));
        assert_eq!(audio.device, Some("Built-in".to_string()));
    }

    #[test]
    fn to_audio_config_applies_overrides() {
        let config = AppConfig {
            audio: Some(AudioSection {
                silence: Some("1500ms".to_string()),
                volume_threshold: Some(0.1),
                device: Some("USB Mic".to_string()),
                high_pass_hz: Some(0.0),
                ..Default::default()
            }),
            ..Default::default()
        };

        let audio = config.to_audio_config().unwrap();
        assert_eq!(audio.silence_duration(), StdDuration::from_millis(1500));
        assert_eq!(audio.volume_threshold(), 0.1);
        assert_eq!(audio.device(), Some("USB Mic"));
        assert_eq!(audio.high_pass_hz(), None);
    }

    #[test]
    fn to_audio_config_rejects_bad_duration() {
        let config = AppConfig {
            audio: Some(AudioSection {
                max_duration: Some("forever".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        match config.to_audio_config() {
            Err(ConfigError::ValidationError { key, .. }) => assert_eq!(key, "audio.max_duration"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn to_audio_config_reports_invalid_field() {
        let config = AppConfig {
            audio: Some(AudioSection {
                speech_gain: Some(0.5),
                background_gain: Some(0.8),
                ..Default::default()
            }),
            ..Default::default()
        };

        match config.to_audio_config() {
            Err(ConfigError::ValidationError { key, .. }) => {
                assert_eq!(key, "audio.background_gain")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn empty_model_list_uses_defaults() {
        let config = AppConfig {
            speech: Some(SpeechSection {
                synthesis_models: Some(vec![]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            config.synthesis_models_or_default(),
            vec!["gpt-4o-mini-tts", "tts-1"]
        );
    }

    #[test]
    fn speech_accessors_return_configured() {
        let config = AppConfig {
            speech: Some(SpeechSection {
                voice: Some("alloy".to_string()),
                language: Some("de".to_string()),
                speed: Some(1.2),
                transcription_models: Some(vec!["whisper-1".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.voice_or_default(), "alloy");
        assert_eq!(config.language_or_default(), "de");
        assert_eq!(config.speed_or_default(), 1.2);
        assert_eq!(config.transcription_models_or_default(), vec!["whisper-1"]);
        assert_eq!(config.temperature_or_default(), DEFAULT_TEMPERATURE);
    }

    #[test]
    fn toml_round_trip() {
        let toml_str = r#"
            api_key = "sk-test"

            [audio]
            silence = "1500ms"
            volume_threshold = 0.05

            [speech]
            transcription_models = ["whisper-1"]
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(
            config.audio.as_ref().unwrap().silence.as_deref(),
            Some("1500ms")
        );
        assert_eq!(config.transcription_models_or_default(), vec!["whisper-1"]);
    }
}
