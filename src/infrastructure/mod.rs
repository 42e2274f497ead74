//! Infrastructure layer - Adapter implementations
//!
//! Concrete implementations of the port interfaces: audio devices, the
//! OpenAI-compatible speech API and the config file.

pub mod audio;
pub mod config;
pub mod speech;

pub use audio::{CpalInput, RodioOutput};
pub use config::XdgConfigStore;
pub use speech::{synthesizer_chain, transcriber_chain, OpenAiSynthesizer, OpenAiTranscriber};
