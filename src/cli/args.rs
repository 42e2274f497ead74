//! CLI argument definitions using Clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::domain::config::{AppConfig, AudioSection};

/// voice-survey - voice-activated capture and playback for spoken questionnaires
#[derive(Parser, Debug)]
#[command(name = "voice-survey")]
#[command(version)]
#[command(about = "Record spoken answers with voice activity detection and play prompts back")]
#[command(long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of the XDG location
    #[arg(long, value_name = "PATH", env = "VOICE_SURVEY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Input device name (see `voice-survey devices`)
    #[arg(long, value_name = "NAME", global = true)]
    pub device: Option<String>,

    /// RMS level at or above which a block counts as speech
    #[arg(long, value_name = "LEVEL", global = true)]
    pub threshold: Option<f32>,

    /// Trailing silence that ends an utterance (e.g., 1500ms, 2s)
    #[arg(long, value_name = "TIME", global = true)]
    pub silence: Option<String>,

    /// Speech required before an utterance can end
    #[arg(long, value_name = "TIME", global = true)]
    pub min_speech: Option<String>,

    /// Hard cap on a single recording
    #[arg(long, value_name = "TIME", global = true)]
    pub max_duration: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The slice of configuration given on the command line
    pub fn overrides(&self) -> AppConfig {
        let audio = AudioSection {
            device: self.device.clone(),
            volume_threshold: self.threshold,
            silence: self.silence.clone(),
            min_speech: self.min_speech.clone(),
            max_duration: self.max_duration.clone(),
            ..Default::default()
        };

        AppConfig {
            audio: (audio != AudioSection::default()).then_some(audio),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List input devices
    Devices,
    /// Record one utterance to a WAV file
    Record {
        /// Output file
        #[arg(short = 'o', long, value_name = "FILE", default_value = "recording.wav")]
        output: PathBuf,
        /// Stop on Enter instead of on trailing silence
        #[arg(long)]
        manual: bool,
    },
    /// Play a WAV or raw 16-bit PCM file
    Play {
        file: PathBuf,
    },
    /// Synthesize text and play it
    Say {
        text: String,
    },
    /// Record one utterance and print the transcript
    Transcribe,
    /// Keep listening and print each utterance until an exit keyword
    Listen,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config action subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create config file with defaults
    Init,
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// Config value
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
}

/// Valid config keys
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "api_key",
    "base_url",
    "audio.sample_rate",
    "audio.channels",
    "audio.block_size",
    "audio.device",
    "audio.volume_threshold",
    "audio.min_speech",
    "audio.silence",
    "audio.patience",
    "audio.max_duration",
    "audio.speech_gain",
    "audio.background_gain",
    "audio.headroom",
    "audio.high_pass_hz",
    "speech.transcription_models",
    "speech.synthesis_models",
    "speech.voice",
    "speech.language",
    "speech.speed",
    "speech.temperature",
];

pub fn is_valid_config_key(key: &str) -> bool {
    VALID_CONFIG_KEYS.contains(&key)
}
