//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod audio;
pub mod config;
pub mod handler;
pub mod synthesizer;
pub mod transcriber;

// Re-export common types
pub use audio::{
    AudioInput, AudioOutput, BlockReceiver, BlockSink, DeviceEnumerator, DeviceInfo, InputEvent,
    InputStream, PlaybackStream,
};
pub use config::ConfigStore;
pub use handler::{HandlerError, UtteranceHandler};
pub use synthesizer::{SynthesisError, Synthesizer};
pub use transcriber::{TranscriptionError, Transcriber};
