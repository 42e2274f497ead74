//! Speech-to-text and text-to-speech adapters

mod openai;

use std::sync::Arc;

pub use openai::{OpenAiSynthesizer, OpenAiTranscriber};

use crate::application::ports::{Synthesizer, Transcriber};
use crate::application::{FallbackSynthesizer, FallbackTranscriber};
use crate::domain::config::AppConfig;

/// One transcriber per configured model, in priority order
pub fn transcriber_chain(config: &AppConfig, api_key: &str) -> FallbackTranscriber {
    let providers = config
        .transcription_models_or_default()
        .into_iter()
        .map(|model| {
            Arc::new(
                OpenAiTranscriber::new(api_key, model)
                    .with_base_url(config.base_url_or_default())
                    .with_language(config.language_or_default())
                    .with_temperature(config.temperature_or_default()),
            ) as Arc<dyn Transcriber>
        })
        .collect();
    FallbackTranscriber::new(providers)
}

/// One synthesizer per configured model, in priority order
pub fn synthesizer_chain(config: &AppConfig, api_key: &str) -> FallbackSynthesizer {
    let providers = config
        .synthesis_models_or_default()
        .into_iter()
        .map(|model| {
            Arc::new(
                OpenAiSynthesizer::new(api_key, model, config.voice_or_default())
                    .with_base_url(config.base_url_or_default())
                    .with_speed(config.speed_or_default()),
            ) as Arc<dyn Synthesizer>
        })
        .collect();
    FallbackSynthesizer::new(providers)
}
