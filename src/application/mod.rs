//! Application layer - Use cases and port interfaces
//!
//! Recording, playback and the continuous listener are written against the
//! traits in [`ports`]; adapters live in the infrastructure layer.

pub mod device_lock;
pub mod fallback;
pub mod listener;
pub mod playback;
pub mod ports;
pub mod recording;
pub mod shutdown;

pub use device_lock::{DeviceLease, DeviceLock};
pub use fallback::{FallbackSynthesizer, FallbackTranscriber};
pub use listener::{ContinuousListener, ListenerConfig, ListenerExit};
pub use playback::{PlaybackError, PlaybackSession, PlaybackState, Player};
pub use recording::{CaptureStats, Recording, RecordingError, RecordingSession, StopHandle, StopReason};
pub use shutdown::ShutdownToken;
