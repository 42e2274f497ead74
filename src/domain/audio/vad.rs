//! Energy-based voice activity detection.
//!
//! The detector consumes one `(instant, level)` observation per block and
//! tracks speech and trailing-silence run lengths. It declares the utterance
//! complete once enough speech has been followed by enough silence, and the
//! session has been open for at least the patience interval.
//!
//! State machine:
//!   AWAITING_SPEECH -> IN_SPEECH          (level >= threshold)
//!   IN_SPEECH -> IN_SPEECH                (level >= threshold)
//!   IN_SPEECH -> TRAILING_SILENCE         (level < threshold)
//!   TRAILING_SILENCE -> IN_SPEECH         (level >= threshold, debounce)
//!   TRAILING_SILENCE -> COMPLETE          (speech, silence and patience satisfied)

use std::fmt;
use std::time::{Duration, Instant};

use super::config::AudioConfig;

/// Detector phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VadPhase {
    #[default]
    AwaitingSpeech,
    InSpeech,
    TrailingSilence,
    Complete,
}

impl VadPhase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingSpeech => "awaiting_speech",
            Self::InSpeech => "in_speech",
            Self::TrailingSilence => "trailing_silence",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for VadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thresholds the detector evaluates, taken from an [`AudioConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadSettings {
    pub volume_threshold: f32,
    pub min_speech_duration: Duration,
    pub silence_duration: Duration,
    pub patience: Duration,
}

impl From<&AudioConfig> for VadSettings {
    fn from(config: &AudioConfig) -> Self {
        Self {
            volume_threshold: config.volume_threshold(),
            min_speech_duration: config.min_speech_duration(),
            silence_duration: config.silence_duration(),
            patience: config.patience(),
        }
    }
}

/// Run-length counters owned by one recording session.
///
/// At most one of `speech_run` and `silence_run` advances per block, and
/// silence only accumulates once speech has been detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VadState {
    pub speech_detected: bool,
    pub speech_run: Duration,
    pub silence_run: Duration,
    pub last_speech_at: Option<Instant>,
    pub session_start: Instant,
}

impl VadState {
    fn new(session_start: Instant) -> Self {
        Self {
            speech_detected: false,
            speech_run: Duration::ZERO,
            silence_run: Duration::ZERO,
            last_speech_at: None,
            session_start,
        }
    }
}

/// Outcome of observing one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VadDecision {
    /// The block is at or above the speech threshold
    pub is_speech: bool,
    /// The utterance completed on this block. Reported exactly once.
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    settings: VadSettings,
    phase: VadPhase,
    state: VadState,
}

impl VoiceActivityDetector {
    pub fn new(settings: VadSettings, session_start: Instant) -> Self {
        Self {
            settings,
            phase: VadPhase::AwaitingSpeech,
            state: VadState::new(session_start),
        }
    }

    pub fn from_config(config: &AudioConfig, session_start: Instant) -> Self {
        Self::new(VadSettings::from(config), session_start)
    }

    pub fn phase(&self) -> VadPhase {
        self.phase
    }

    pub fn state(&self) -> &VadState {
        &self.state
    }

    pub fn settings(&self) -> &VadSettings {
        &self.settings
    }

    pub fn is_complete(&self) -> bool {
        self.phase == VadPhase::Complete
    }

    /// Feed one block's level.
    ///
    /// `at` is the block's arrival instant and `block` its duration. The
    /// returned decision classifies the block even after completion.
    pub fn observe(&mut self, at: Instant, level: f32, block: Duration) -> VadDecision {
        let is_speech = level >= self.settings.volume_threshold;

        if self.phase == VadPhase::Complete {
            return VadDecision {
                is_speech,
                completed: false,
            };
        }

        let previous = self.phase;
        if is_speech {
            self.state.speech_detected = true;
            self.state.speech_run += block;
            self.state.silence_run = Duration::ZERO;
            self.state.last_speech_at = Some(at);
            self.phase = VadPhase::InSpeech;
        } else if self.state.speech_detected {
            self.state.silence_run += block;
            self.phase = VadPhase::TrailingSilence;
        }

        let completed = self.phase == VadPhase::TrailingSilence && self.completion_due(at);
        if completed {
            self.phase = VadPhase::Complete;
        }

        if previous != self.phase {
            tracing::debug!(
                from = %previous,
                to = %self.phase,
                speech_ms = self.state.speech_run.as_millis() as u64,
                silence_ms = self.state.silence_run.as_millis() as u64,
                "vad transition"
            );
        }

        VadDecision {
            is_speech,
            completed,
        }
    }

    fn completion_due(&self, at: Instant) -> bool {
        let elapsed = at.saturating_duration_since(self.state.session_start);
        self.state.speech_run >= self.settings.min_speech_duration
            && self.state.silence_run >= self.settings.silence_duration
            && elapsed >= self.settings.patience
    }
}
