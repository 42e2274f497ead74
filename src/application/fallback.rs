//! Prioritised provider chains for transcription and synthesis

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::audio::EncodedAudio;

use super::ports::{SynthesisError, Synthesizer, TranscriptionError, Transcriber};

/// Tries each transcriber in order until one succeeds.
///
/// When every provider fails the chain yields empty text, which callers
/// treat as "nothing recognised".
pub struct FallbackTranscriber {
    providers: Vec<Arc<dyn Transcriber>>,
}

impl FallbackTranscriber {
    pub fn new(providers: Vec<Arc<dyn Transcriber>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl Transcriber for FallbackTranscriber {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn transcribe(&self, audio: &EncodedAudio) -> Result<String, TranscriptionError> {
        if self.providers.is_empty() {
            return Err(TranscriptionError::NoProviders);
        }

        for provider in &self.providers {
            match provider.transcribe(audio).await {
                Ok(text) => {
                    tracing::debug!(provider = provider.name(), chars = text.len(), "transcribed");
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "transcription failed");
                }
            }
        }

        tracing::warn!(providers = self.providers.len(), "all transcription providers failed");
        Ok(String::new())
    }
}

/// Tries each synthesizer in order, returning the last error if all fail
pub struct FallbackSynthesizer {
    providers: Vec<Arc<dyn Synthesizer>>,
}

impl FallbackSynthesizer {
    pub fn new(providers: Vec<Arc<dyn Synthesizer>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl Synthesizer for FallbackSynthesizer {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn synthesize(&self, text: &str) -> Result<EncodedAudio, SynthesisError> {
        let mut last_error = SynthesisError::NoProviders;

        for provider in &self.providers {
            match provider.synthesize(text).await {
                Ok(audio) => {
                    tracing::debug!(provider = provider.name(), size = audio.size_bytes(), "synthesized");
                    return Ok(audio);
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "synthesis failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
