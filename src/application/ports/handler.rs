//! Utterance handler port

use async_trait::async_trait;

/// Error type a handler may return; the listener only logs it
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives each transcribed utterance from the continuous listener
#[async_trait]
pub trait UtteranceHandler: Send + Sync {
    async fn on_utterance(&self, text: &str) -> Result<(), HandlerError>;
}
