//! Configuration domain

mod app_config;

pub use app_config::{
    AppConfig, AudioSection, SpeechSection, DEFAULT_BASE_URL, DEFAULT_SYNTHESIS_MODELS,
    DEFAULT_TRANSCRIPTION_MODELS,
};
