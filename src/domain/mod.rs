//! Domain layer - Core business logic
//!
//! Contains value objects, entities, pure signal logic and domain errors.
//! This layer has no dependencies on external systems.

pub mod audio;
pub mod config;
pub mod error;
pub mod listener;
pub mod recording;

// Re-export common types
pub use audio::{AudioBlock, AudioConfig, EncodedAudio};
pub use config::AppConfig;
pub use error::*;
pub use listener::{ListenerSession, ListenerState};
pub use recording::Duration;
