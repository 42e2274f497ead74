//! Playback use case
//!
//! A [`Player`] keeps at most one [`PlaybackSession`] active and fully
//! releases the previous one before starting the next.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::watch;

use crate::domain::audio::{AudioCodec, EncodedAudio, PcmDefaults};
use crate::domain::error::AudioDeviceError;

use super::device_lock::DeviceLock;
use super::ports::{AudioOutput, PlaybackStream, SynthesisError, Synthesizer};
use super::shutdown::ShutdownToken;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Device(#[from] AudioDeviceError),

    #[error("Playback was cancelled")]
    Cancelled,

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("Playback task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Finished,
    Stopped,
}

impl PlaybackState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Finished => "finished",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One submitted playback. Holds the output lease until it ends.
pub struct PlaybackSession {
    stream: Arc<dyn PlaybackStream>,
    stop_requested: Arc<AtomicBool>,
    state: watch::Receiver<PlaybackState>,
}

impl PlaybackSession {
    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    /// Stop immediately. Idempotent and safe from any context.
    pub fn stop(&self) {
        if !self.stop_requested.swap(true, Ordering::AcqRel) {
            tracing::debug!("stopping playback");
            self.stream.stop();
        }
    }

    /// Wait until playback has ended and the device is released
    pub async fn wait(&self) -> PlaybackState {
        let mut state = self.state.clone();
        let result = match state.wait_for(|s| *s != PlaybackState::Playing).await {
            Ok(s) => *s,
            // Watcher gone without reporting; the lease went with it
            Err(_) => PlaybackState::Stopped,
        };
        result
    }

    /// Wait for playback to end, stopping it if `token` is cancelled first
    pub async fn await_finished(
        &self,
        token: &ShutdownToken,
    ) -> Result<PlaybackState, PlaybackError> {
        tokio::select! {
            state = self.wait() => Ok(state),
            _ = token.cancelled() => {
                self.stop();
                self.wait().await;
                Err(PlaybackError::Cancelled)
            }
        }
    }
}

/// The active session. `generation` moves on every play and stop, so a
/// start that finishes after being superseded can tell.
#[derive(Default)]
struct Slot {
    session: Option<Arc<PlaybackSession>>,
    generation: u64,
}

pub struct Player {
    output: Arc<dyn AudioOutput>,
    lock: DeviceLock,
    defaults: PcmDefaults,
    current: Mutex<Slot>,
}

impl Player {
    /// Create a player on the process-wide output lock
    pub fn new(output: Arc<dyn AudioOutput>, defaults: PcmDefaults) -> Self {
        Self {
            output,
            lock: DeviceLock::output(),
            defaults,
            current: Mutex::new(Slot::default()),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the active session and invalidate any start still in flight
    fn supersede(&self) -> (Option<Arc<PlaybackSession>>, u64) {
        let mut slot = self.slot();
        slot.generation += 1;
        (slot.session.take(), slot.generation)
    }

    pub fn with_lock(mut self, lock: DeviceLock) -> Self {
        self.lock = lock;
        self
    }

    /// Start playing `audio`, first stopping whatever is playing.
    ///
    /// Returns once playback has been submitted to the device. Unreadable
    /// headers fall back to raw PCM at the configured rate and channels.
    pub async fn play(&self, audio: &EncodedAudio) -> Result<Arc<PlaybackSession>, PlaybackError> {
        let (previous, generation) = self.supersede();
        if let Some(previous) = previous {
            previous.stop();
            previous.wait().await;
        }

        let decoded = AudioCodec::decode_or_raw(audio.data(), self.defaults);
        let lease = self.lock.try_acquire().ok_or(AudioDeviceError::Busy)?;

        let output = Arc::clone(&self.output);
        let duration = decoded.duration();
        let stream: Arc<dyn PlaybackStream> =
            tokio::task::spawn_blocking(move || output.start(decoded))
                .await
                .map_err(|e| PlaybackError::TaskFailed(e.to_string()))??
                .into();

        tracing::info!(duration_ms = duration.as_millis() as u64, "playback started");

        let (state_tx, state_rx) = watch::channel(PlaybackState::Playing);
        let stop_requested = Arc::new(AtomicBool::new(false));

        let watched = Arc::clone(&stream);
        let stopped = Arc::clone(&stop_requested);
        tokio::spawn(async move {
            watched.finished().await;
            drop(lease);
            let state = if stopped.load(Ordering::Acquire) {
                PlaybackState::Stopped
            } else {
                PlaybackState::Finished
            };
            tracing::debug!(%state, "playback ended");
            let _ = state_tx.send(state);
        });

        let session = Arc::new(PlaybackSession {
            stream,
            stop_requested,
            state: state_rx,
        });
        let superseded = {
            let mut slot = self.slot();
            if slot.generation == generation {
                slot.session = Some(Arc::clone(&session));
                false
            } else {
                true
            }
        };
        if superseded {
            tracing::debug!("playback superseded while starting");
            session.stop();
        }
        Ok(session)
    }

    /// Stop the active playback, if any, and wait for the device release.
    ///
    /// A playback still starting is stopped as soon as its stream is up.
    pub async fn stop(&self) {
        let (session, _) = self.supersede();
        if let Some(session) = session {
            session.stop();
            session.wait().await;
        }
    }

    /// Synthesise `text`, play it, and wait until it has been heard
    pub async fn say(
        &self,
        synthesizer: &dyn Synthesizer,
        text: &str,
        token: &ShutdownToken,
    ) -> Result<PlaybackState, PlaybackError> {
        let audio = tokio::select! {
            audio = synthesizer.synthesize(text) => audio?,
            _ = token.cancelled() => return Err(PlaybackError::Cancelled),
        };
        let session = self.play(&audio).await?;
        session.await_finished(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audio::DecodedAudio;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Output whose streams last `length`, or until stopped
    struct FakeOutput {
        length: Duration,
        start_delay: Duration,
        started: AtomicUsize,
        last: std::sync::Mutex<Option<DecodedAudio>>,
    }

    impl FakeOutput {
        fn new(length: Duration) -> Arc<Self> {
            Self::slow(length, Duration::ZERO)
        }

        fn slow(length: Duration, start_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                length,
                start_delay,
                started: AtomicUsize::new(0),
                last: std::sync::Mutex::new(None),
            })
        }
    }

    struct FakeStream {
        length: Duration,
        stop: Arc<Notify>,
        stopped: AtomicBool,
    }

    #[async_trait]
    impl PlaybackStream for FakeStream {
        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
            self.stop.notify_one();
        }

        async fn finished(&self) {
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.length) => {}
                _ = self.stop.notified() => {}
            }
        }
    }

    impl AudioOutput for FakeOutput {
        fn start(&self, audio: DecodedAudio) -> Result<Box<dyn PlaybackStream>, AudioDeviceError> {
            std::thread::sleep(self.start_delay);
            self.started.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(audio);
            Ok(Box::new(FakeStream {
                length: self.length,
                stop: Arc::new(Notify::new()),
                stopped: AtomicBool::new(false),
            }))
        }
    }

    struct FixedSynth;

    #[async_trait]
    impl Synthesizer for FixedSynth {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn synthesize(&self, _text: &str) -> Result<EncodedAudio, SynthesisError> {
            AudioCodec::encode(&[0.1; 160], 16_000, 1)
                .map_err(|e| SynthesisError::ApiError(e.to_string()))
        }
    }

    struct BrokenSynth;

    #[async_trait]
    impl Synthesizer for BrokenSynth {
        fn name(&self) -> &str {
            "broken"
        }

        async fn synthesize(&self, _text: &str) -> Result<EncodedAudio, SynthesisError> {
            Err(SynthesisError::RateLimited)
        }
    }

    fn wav() -> EncodedAudio {
        AudioCodec::encode(&[0.2; 1600], 16_000, 1).unwrap()
    }

    fn player(output: Arc<FakeOutput>, lock: DeviceLock) -> Player {
        Player::new(output, PcmDefaults::default()).with_lock(lock)
    }

    #[tokio::test]
    async fn plays_to_completion() {
        let lock = DeviceLock::new();
        let player = player(FakeOutput::new(Duration::from_millis(20)), lock.clone());

        let session = player.play(&wav()).await.unwrap();
        assert!(lock.is_held());
        assert_eq!(session.state(), PlaybackState::Playing);

        let state = session.await_finished(&ShutdownToken::new()).await.unwrap();
        assert_eq!(state, PlaybackState::Finished);
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let player = player(FakeOutput::new(Duration::from_secs(10)), DeviceLock::new());
        let session = player.play(&wav()).await.unwrap();

        session.stop();
        session.stop();
        assert_eq!(session.wait().await, PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn new_playback_preempts_previous() {
        let lock = DeviceLock::new();
        let output = FakeOutput::new(Duration::from_secs(10));
        let player = player(output.clone(), lock.clone());

        let first = player.play(&wav()).await.unwrap();
        let second = player.play(&wav()).await.unwrap();

        assert_eq!(first.state(), PlaybackState::Stopped);
        assert_eq!(second.state(), PlaybackState::Playing);
        assert_eq!(output.started.load(Ordering::SeqCst), 2);
        assert!(lock.is_held());

        player.stop().await;
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn stop_does_not_wait_for_a_starting_playback() {
        let lock = DeviceLock::new();
        let output = FakeOutput::slow(Duration::from_secs(10), Duration::from_millis(200));
        let player = Arc::new(player(output, lock.clone()));

        let starting = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.play(&wav()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_millis(100), player.stop())
            .await
            .expect("stop blocked behind a starting playback");

        let session = starting.await.unwrap().unwrap();
        assert_eq!(session.wait().await, PlaybackState::Stopped);
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn cancel_stops_and_releases() {
        let lock = DeviceLock::new();
        let player = player(FakeOutput::new(Duration::from_secs(10)), lock.clone());
        let session = player.play(&wav()).await.unwrap();

        let token = ShutdownToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        assert!(matches!(
            session.await_finished(&token).await,
            Err(PlaybackError::Cancelled)
        ));
        assert_eq!(session.state(), PlaybackState::Stopped);
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn busy_output_is_reported() {
        let lock = DeviceLock::new();
        let _held = lock.try_acquire().unwrap();
        let player = player(FakeOutput::new(Duration::from_millis(10)), lock);

        assert!(matches!(
            player.play(&wav()).await,
            Err(PlaybackError::Device(AudioDeviceError::Busy))
        ));
    }

    #[tokio::test]
    async fn headerless_audio_plays_as_raw_pcm() {
        let output = FakeOutput::new(Duration::from_millis(5));
        let player = Player::new(
            output.clone(),
            PcmDefaults {
                sample_rate: 24_000,
                channels: 1,
            },
        )
        .with_lock(DeviceLock::new());

        let raw = EncodedAudio::new(vec![0, 0, 0, 64, 0, 192, 9]);
        let session = player.play(&raw).await.unwrap();
        session.wait().await;

        let played = output.last.lock().unwrap().clone().unwrap();
        assert_eq!(played.sample_rate, 24_000);
        assert_eq!(played.samples, vec![0.0, 0.5, -0.5]);
    }

    #[tokio::test]
    async fn say_synthesises_and_waits() {
        let output = FakeOutput::new(Duration::from_millis(5));
        let player = player(output.clone(), DeviceLock::new());

        let state = player
            .say(&FixedSynth, "Hello", &ShutdownToken::new())
            .await
            .unwrap();
        assert_eq!(state, PlaybackState::Finished);
        assert_eq!(output.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn say_reports_synthesis_failure() {
        let output = FakeOutput::new(Duration::from_millis(5));
        let player = player(output.clone(), DeviceLock::new());

        assert!(matches!(
            player.say(&BrokenSynth, "Hello", &ShutdownToken::new()).await,
            Err(PlaybackError::Synthesis(SynthesisError::RateLimited))
        ));
        assert_eq!(output.started.load(Ordering::SeqCst), 0);
    }
}
