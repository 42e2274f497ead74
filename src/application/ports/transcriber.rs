//! Transcription port interface

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::audio::EncodedAudio;

/// Transcription errors
#[derive(Debug, Clone, Error)]
pub enum TranscriptionError {
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Empty audio response")]
    EmptyResponse,

    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("No transcription providers configured")]
    NoProviders,
}

/// Port for speech-to-text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Short label used in logs, such as the model name
    fn name(&self) -> &str;

    /// Transcribe a WAV buffer to text.
    async fn transcribe(&self, audio: &EncodedAudio) -> Result<String, TranscriptionError>;
}
