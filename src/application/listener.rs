//! Continuous listening use case
//!
//! Records one utterance at a time, transcribes it and hands the text to a
//! handler until an exit keyword is heard or the listener is stopped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::audio::{AudioConfig, LiveMeter};
use crate::domain::listener::{ListenerSession, ListenerState};

use super::device_lock::DeviceLock;
use super::ports::{AudioInput, DeviceEnumerator, Transcriber, UtteranceHandler};
use super::recording::{RecordingError, RecordingSession};
use super::shutdown::ShutdownToken;

pub const DEFAULT_EXIT_KEYWORDS: [&str; 3] = ["exit", "quit", "stop"];
pub const DEFAULT_PAUSE_BETWEEN: Duration = Duration::from_millis(500);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Listener tuning
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    /// Lowercase words that end the loop when they are the whole utterance
    pub exit_keywords: Vec<String>,
    /// Ignore trailing punctuation when matching, so a transcript of
    /// `"Stop."` still ends the loop. Off means an exact match after
    /// trimming and lowercasing.
    pub ignore_trailing_punctuation: bool,
    pub pause_between: Duration,
    pub retry_backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            exit_keywords: DEFAULT_EXIT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            ignore_trailing_punctuation: true,
            pause_between: DEFAULT_PAUSE_BETWEEN,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl ListenerConfig {
    /// Match the whole of `text` against the exit keywords, ignoring case
    /// and surrounding whitespace. Speech-to-text services tend to close a
    /// one-word utterance with a full stop, so trailing punctuation is
    /// dropped too unless `ignore_trailing_punctuation` is off.
    pub fn exit_keyword(&self, text: &str) -> Option<&str> {
        let mut trimmed = text.trim();
        if self.ignore_trailing_punctuation {
            trimmed = trimmed.trim_end_matches(|c: char| c.is_ascii_punctuation());
        }
        let normalized = trimmed.to_lowercase();
        self.exit_keywords
            .iter()
            .find(|k| **k == normalized)
            .map(String::as_str)
    }
}

/// How the loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    ExitKeyword(String),
    Stopped,
}

enum Iteration {
    Utterance(String),
    Retry,
    Cancelled,
}

enum Dispatch {
    Handled,
    Failed,
    Cancelled,
}

pub struct ContinuousListener {
    audio: AudioConfig,
    input: Arc<dyn AudioInput>,
    enumerator: Option<Arc<dyn DeviceEnumerator>>,
    lock: DeviceLock,
    transcriber: Arc<dyn Transcriber>,
    config: ListenerConfig,
    token: ShutdownToken,
    meter: LiveMeter,
    session: Mutex<ListenerSession>,
}

impl ContinuousListener {
    /// `parent` cancels the listener; [`stop`](Self::stop) only affects this listener.
    pub fn new(
        audio: AudioConfig,
        input: Arc<dyn AudioInput>,
        transcriber: Arc<dyn Transcriber>,
        parent: &ShutdownToken,
    ) -> Self {
        Self {
            audio,
            input,
            enumerator: None,
            lock: DeviceLock::input(),
            transcriber,
            config: ListenerConfig::default(),
            token: parent.child(),
            meter: LiveMeter::new(),
            session: Mutex::new(ListenerSession::new()),
        }
    }

    pub fn with_config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_enumerator(mut self, enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    pub fn with_lock(mut self, lock: DeviceLock) -> Self {
        self.lock = lock;
        self
    }

    /// Meter shared by every recording the listener makes
    pub fn meter(&self) -> LiveMeter {
        self.meter.clone()
    }

    pub fn state(&self) -> ListenerState {
        self.with_session(|s| s.state())
    }

    /// End the loop at the next suspension point. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
        self.with_session(ListenerSession::stop);
    }

    /// Run until an exit keyword is heard or the listener is stopped.
    pub async fn run(&self, handler: &dyn UtteranceHandler) -> ListenerExit {
        if let Err(e) = self.with_session(ListenerSession::start) {
            tracing::warn!(error = %e, "listener not started");
            return ListenerExit::Stopped;
        }
        tracing::info!("listener started");

        let exit = loop {
            if self.token.is_cancelled() {
                break ListenerExit::Stopped;
            }

            let text = match self.next_utterance().await {
                Iteration::Cancelled => break ListenerExit::Stopped,
                Iteration::Retry => {
                    if !self.pause(self.config.retry_backoff).await {
                        break ListenerExit::Stopped;
                    }
                    continue;
                }
                Iteration::Utterance(text) => text,
            };

            if let Some(keyword) = self.config.exit_keyword(&text) {
                tracing::info!(keyword, "exit keyword heard");
                break ListenerExit::ExitKeyword(keyword.to_string());
            }

            let wait = if text.trim().is_empty() {
                self.config.pause_between
            } else {
                match self.dispatch(handler, text.trim()).await {
                    Dispatch::Handled => self.config.pause_between,
                    Dispatch::Failed => self.config.retry_backoff,
                    Dispatch::Cancelled => break ListenerExit::Stopped,
                }
            };
            if !self.pause(wait).await {
                break ListenerExit::Stopped;
            }
        };

        self.with_session(ListenerSession::stop);
        tracing::info!(?exit, "listener finished");
        exit
    }

    /// Record and transcribe one utterance
    async fn next_utterance(&self) -> Iteration {
        let mut recording = RecordingSession::new(
            self.audio.clone(),
            Arc::clone(&self.input),
            self.token.clone(),
        )
        .with_lock(self.lock.clone())
        .with_meter(self.meter.clone());
        if let Some(enumerator) = &self.enumerator {
            recording = recording.with_enumerator(Arc::clone(enumerator));
        }

        if let Err(e) = recording.start(true).await {
            tracing::warn!(error = %e, "could not start recording");
            return Iteration::Retry;
        }

        let recording = match recording.await_completion().await {
            Ok(recording) if self.token.is_cancelled() => {
                tracing::debug!(reason = %recording.reason, "discarding recording on shutdown");
                return Iteration::Cancelled;
            }
            Ok(recording) => recording,
            Err(RecordingError::Cancelled) => return Iteration::Cancelled,
            Err(e) => {
                tracing::warn!(error = %e, "recording failed");
                return Iteration::Retry;
            }
        };

        tokio::select! {
            result = self.transcriber.transcribe(&recording.audio) => match result {
                Ok(text) => Iteration::Utterance(text),
                Err(e) => {
                    tracing::warn!(error = %e, "transcription failed");
                    Iteration::Utterance(String::new())
                }
            },
            _ = self.token.cancelled() => Iteration::Cancelled,
        }
    }

    async fn dispatch(&self, handler: &dyn UtteranceHandler, text: &str) -> Dispatch {
        if let Err(e) = self.with_session(ListenerSession::begin_callback) {
            tracing::warn!(error = %e, "skipping handler");
            return Dispatch::Cancelled;
        }

        let outcome = tokio::select! {
            result = handler.on_utterance(text) => match result {
                Ok(()) => Dispatch::Handled,
                Err(e) => {
                    tracing::warn!(error = %e, "utterance handler failed");
                    Dispatch::Failed
                }
            },
            _ = self.token.cancelled() => Dispatch::Cancelled,
        };

        if let Err(e) = self.with_session(ListenerSession::finish_callback) {
            tracing::debug!(error = %e, "listener stopped during handler");
        }
        outcome
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.token.cancelled() => false,
        }
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut ListenerSession) -> T) -> T {
        let mut session = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut session)
    }
}
