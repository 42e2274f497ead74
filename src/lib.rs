//! voice-survey - voice-activity-detected capture and playback
//!
//! Records spoken answers from the microphone, ends each one automatically
//! once the speaker falls silent, and plays synthesized or stored prompts
//! back through the speakers.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: audio blocks, the volume meter and voice activity detector,
//!   the WAV codec, signal processing, configuration and errors
//! - **Application**: recording and playback sessions, the continuous
//!   listener, provider fallback chains and the port traits
//! - **Infrastructure**: cpal capture, rodio playback, OpenAI-compatible
//!   speech adapters and the XDG config store
//! - **CLI**: argument parsing, presentation and signal handling

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
