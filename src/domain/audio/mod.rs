//! Audio value objects and pure signal logic

mod block;
pub mod codec;
pub mod config;
mod meter;
pub mod processing;
pub mod vad;

pub use block::{AudioBlock, EncodedAudio};
pub use codec::{AudioCodec, DecodedAudio, PcmDefaults};
pub use config::{AudioConfig, AudioConfigBuilder, InvalidAudioConfig};
pub use meter::{LiveMeter, VolumeMeter};
pub use processing::ProcessingError;
pub use vad::{VadDecision, VadPhase, VadSettings, VadState, VoiceActivityDetector};
