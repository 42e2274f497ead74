//! Domain error types

use thiserror::Error;

/// Error when parsing a duration string
#[derive(Debug, Clone, Error)]
#[error("Invalid duration format: \"{input}\". Expected format: <number>ms, <number>s, <number>m, or <number>m<number>s (e.g., 1500ms, 30s, 1m, 2m30s)")]
pub struct DurationParseError {
    pub input: String,
}

/// Error when configuration fails
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid config value for '{key}': {message}")]
    ValidationError { key: String, message: String },

    #[error("Config file already exists at: {0}")]
    AlreadyExists(String),
}

/// Audio device errors (input or output)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioDeviceError {
    #[error("No audio device available")]
    NoDevice,

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Permission to use the audio device was denied")]
    PermissionDenied,

    #[error("Audio device is already in use by another session")]
    Busy,

    #[error("Session has already been started")]
    AlreadyStarted,

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to open audio stream: {0}")]
    Open(String),

    #[error("Audio stream fault: {0}")]
    StreamFault(String),
}

/// Errors from the audio container codec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Malformed audio container: {0}")]
    Malformed(String),

    #[error("Unsupported audio container: {0}")]
    Unsupported(String),

    #[error("Failed to write audio container: {0}")]
    Write(String),
}
