//! Speech synthesis port interface

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::audio::EncodedAudio;

/// Synthesis errors
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
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

    #[error("No synthesis providers configured")]
    NoProviders,
}

/// Port for text-to-speech
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Render text as audio in the portable container format.
    async fn synthesize(&self, text: &str) -> Result<EncodedAudio, SynthesisError>;
}
