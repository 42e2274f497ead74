//! Recording session use case
//!
//! A session owns the input lease for its whole capture. The device callback
//! only pushes blocks into a bounded channel. One capture task owns the
//! detector and the accumulation buffer, so no lock guards capture state.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::domain::audio::processing::{self, ProcessingError};
use crate::domain::audio::{
    AudioBlock, AudioCodec, AudioConfig, EncodedAudio, LiveMeter, VoiceActivityDetector,
    VolumeMeter,
};
use crate::domain::error::{AudioDeviceError, FormatError};

use super::device_lock::{DeviceLease, DeviceLock};
use super::ports::{
    AudioInput, BlockReceiver, BlockSink, DeviceEnumerator, InputEvent, InputStream,
};
use super::shutdown::ShutdownToken;

/// Recording errors
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error(transparent)]
    Device(#[from] AudioDeviceError),

    #[error("No audio was captured")]
    EmptyCapture,

    #[error("Failed to encode recording: {0}")]
    Encode(#[from] FormatError),

    #[error("Failed to process recording: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Recording was cancelled")]
    Cancelled,

    #[error("Recording session was never started")]
    NotStarted,

    #[error("Capture task failed: {0}")]
    TaskFailed(String),
}

/// Why a capture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The detector declared the utterance complete
    AutoStop,
    /// `stop()` was called
    Stopped,
    MaxDuration,
    Cancelled,
    /// The stream faulted fatally or the adapter went away
    DeviceLost,
}

impl StopReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AutoStop => "auto_stop",
            Self::Stopped => "stopped",
            Self::MaxDuration => "max_duration",
            Self::Cancelled => "cancelled",
            Self::DeviceLost => "device_lost",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters collected by the capture task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub blocks: u64,
    pub dropped_blocks: u64,
    pub speech: Duration,
    pub trailing_silence: Duration,
    pub captured: Duration,
}

/// A finished capture
#[derive(Debug, Clone)]
pub struct Recording {
    pub audio: EncodedAudio,
    pub reason: StopReason,
    pub stats: CaptureStats,
}

/// Cloneable handle that asks a session to stop. Safe from any context.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: ShutdownToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn stopped(&self) {
        self.token.cancelled().await
    }
}

struct CaptureOutcome {
    reason: StopReason,
    samples: Vec<f32>,
    device_rate: u32,
    stats: CaptureStats,
}

pub struct RecordingSession {
    config: AudioConfig,
    input: Arc<dyn AudioInput>,
    enumerator: Option<Arc<dyn DeviceEnumerator>>,
    lock: DeviceLock,
    token: ShutdownToken,
    meter: LiveMeter,
    stop: StopHandle,
    started: bool,
    task: Option<JoinHandle<CaptureOutcome>>,
}

impl RecordingSession {
    /// Create a session on the process-wide input lock
    pub fn new(config: AudioConfig, input: Arc<dyn AudioInput>, token: ShutdownToken) -> Self {
        Self {
            config,
            input,
            enumerator: None,
            lock: DeviceLock::input(),
            token,
            meter: LiveMeter::new(),
            stop: StopHandle::default(),
            started: false,
            task: None,
        }
    }

    /// Validate named devices against this enumerator at start
    pub fn with_enumerator(mut self, enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    pub fn with_lock(mut self, lock: DeviceLock) -> Self {
        self.lock = lock;
        self
    }

    /// Publish levels to an existing meter instead of a private one
    pub fn with_meter(mut self, meter: LiveMeter) -> Self {
        self.meter = meter;
        self
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn meter(&self) -> LiveMeter {
        self.meter.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Acquire the input device and begin capturing.
    ///
    /// With `auto_stop`, capture ends on its own once the detector declares
    /// the utterance complete.
    pub async fn start(&mut self, auto_stop: bool) -> Result<(), AudioDeviceError> {
        if self.started {
            return Err(AudioDeviceError::AlreadyStarted);
        }
        let lease = self.lock.try_acquire().ok_or(AudioDeviceError::Busy)?;

        let (sink, receiver) = BlockSink::channel(self.config.channel_capacity());
        let input = Arc::clone(&self.input);
        let enumerator = self.enumerator.clone();
        let config = self.config.clone();

        // The lease travels with the stream, so abandoning this future while
        // the device opens cannot free the lock ahead of the device.
        let device = tokio::task::spawn_blocking(move || {
            if let (Some(name), Some(enumerator)) = (config.device(), enumerator) {
                let devices = enumerator.list_input_devices()?;
                if !devices.iter().any(|d| d.name == name) {
                    return Err(AudioDeviceError::DeviceNotFound(name.to_string()));
                }
            }
            let stream = input.open(&config, sink)?;
            Ok(OpenInput::new(stream, lease))
        })
        .await
        .map_err(|e| AudioDeviceError::Open(format!("device open task failed: {}", e)))??;

        let device_rate = device.sample_rate();
        let session_start = Instant::now();
        tracing::info!(
            device = self.config.device().unwrap_or("default"),
            device_rate,
            auto_stop,
            "recording started"
        );

        let task = CaptureTask {
            vad: VoiceActivityDetector::from_config(&self.config, session_start),
            config: self.config.clone(),
            device_rate,
            receiver,
            device: Some(device),
            meter: self.meter.clone(),
            stop: self.stop.clone(),
            token: self.token.clone(),
            auto_stop,
            samples: Vec::new(),
            stats: CaptureStats::default(),
        };

        self.started = true;
        self.task = Some(tokio::spawn(task.run()));
        Ok(())
    }

    /// Ask the capture to end. Idempotent and non-blocking.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait for the capture to end, then finalise and encode the buffer.
    ///
    /// A cancelled capture with audio still yields a recording, with
    /// [`StopReason::Cancelled`].
    pub async fn await_completion(mut self) -> Result<Recording, RecordingError> {
        let task = self.task.take().ok_or(RecordingError::NotStarted)?;
        let outcome = task
            .await
            .map_err(|e| RecordingError::TaskFailed(e.to_string()))?;

        let CaptureOutcome {
            reason,
            samples,
            device_rate,
            stats,
        } = outcome;

        if samples.is_empty() {
            return Err(match reason {
                StopReason::Cancelled => RecordingError::Cancelled,
                _ => RecordingError::EmptyCapture,
            });
        }

        let config = self.config.clone();
        let encoded = tokio::task::spawn_blocking(move || -> Result<EncodedAudio, RecordingError> {
            let samples = processing::finalize(samples, device_rate, &config)?;
            Ok(AudioCodec::encode(&samples, config.sample_rate(), 1)?)
        })
        .await
        .map_err(|e| RecordingError::TaskFailed(e.to_string()))
        .and_then(|result| result);

        let audio = match encoded {
            Ok(audio) => audio,
            Err(e) if reason == StopReason::Cancelled => {
                tracing::warn!(error = %e, "discarding cancelled recording");
                return Err(RecordingError::Cancelled);
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            %reason,
            blocks = stats.blocks,
            dropped = stats.dropped_blocks,
            size = %audio.human_readable_size(),
            "recording finished"
        );

        Ok(Recording {
            audio,
            reason,
            stats,
        })
    }
}

/// An opened input stream together with the lease that guards it.
///
/// Dropping it closes the stream before the lease is released.
struct OpenInput {
    stream: Option<Box<dyn InputStream>>,
    _lease: DeviceLease,
}

impl OpenInput {
    fn new(stream: Box<dyn InputStream>, lease: DeviceLease) -> Self {
        Self {
            stream: Some(stream),
            _lease: lease,
        }
    }

    fn sample_rate(&self) -> u32 {
        self.stream.as_ref().map_or(0, |s| s.sample_rate())
    }

    /// Blocks until the device has stopped. The lease stays held.
    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
    }
}

impl Drop for OpenInput {
    fn drop(&mut self) {
        self.close();
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        // The capture task releases the device once it sees the request
        self.stop.stop();
    }
}

struct CaptureTask {
    config: AudioConfig,
    vad: VoiceActivityDetector,
    device_rate: u32,
    receiver: BlockReceiver,
    device: Option<OpenInput>,
    meter: LiveMeter,
    stop: StopHandle,
    token: ShutdownToken,
    auto_stop: bool,
    samples: Vec<f32>,
    stats: CaptureStats,
}

impl CaptureTask {
    async fn run(mut self) -> CaptureOutcome {
        let deadline = tokio::time::sleep(self.config.max_duration());
        tokio::pin!(deadline);

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.stop.stopped() => break StopReason::Stopped,
                _ = self.token.cancelled() => break StopReason::Cancelled,
                _ = &mut deadline => break StopReason::MaxDuration,
                event = self.receiver.recv() => match event {
                    Some(InputEvent::Block(block)) => {
                        if self.ingest(block) && self.auto_stop {
                            break StopReason::AutoStop;
                        }
                    }
                    Some(InputEvent::Fault { message, fatal: false }) => {
                        tracing::warn!(%message, "input stream fault");
                    }
                    Some(InputEvent::Fault { message, fatal: true }) => {
                        tracing::error!(%message, "input stream lost");
                        break StopReason::DeviceLost;
                    }
                    None => {
                        tracing::error!("input stream closed unexpectedly");
                        break StopReason::DeviceLost;
                    }
                },
            }
        };

        self.shutdown().await;

        self.stats.dropped_blocks = self.receiver.dropped();
        self.stats.speech = self.vad.state().speech_run;
        self.stats.trailing_silence = self.vad.state().silence_run;
        if self.device_rate > 0 {
            self.stats.captured =
                Duration::from_secs_f64(self.samples.len() as f64 / self.device_rate as f64);
        }

        tracing::debug!(%reason, blocks = self.stats.blocks, "capture ended");

        CaptureOutcome {
            reason,
            samples: self.samples,
            device_rate: self.device_rate,
            stats: self.stats,
        }
    }

    /// Process one block. Returns true when the utterance completed on it.
    fn ingest(&mut self, block: AudioBlock) -> bool {
        let level = VolumeMeter::level(&block);
        let decision = self.vad.observe(block.captured_at(), level, block.duration());
        self.meter.publish(level, decision.is_speech);

        let gain = if decision.is_speech {
            self.config.speech_gain()
        } else {
            self.config.background_gain()
        };
        let mut samples = block.into_samples();
        processing::apply_gain(&mut samples, gain);
        self.samples.extend_from_slice(&samples);
        self.stats.blocks += 1;

        decision.completed
    }

    /// Close the device, keep what it already delivered, and release the lease
    async fn shutdown(&mut self) {
        let device = match self.device.take() {
            Some(mut device) => {
                match tokio::task::spawn_blocking(move || {
                    device.close();
                    device
                })
                .await
                {
                    Ok(device) => Some(device),
                    Err(e) => {
                        tracing::warn!(error = %e, "closing input stream failed");
                        None
                    }
                }
            }
            None => None,
        };

        self.receiver.close();
        while let Some(event) = self.receiver.try_recv() {
            if let InputEvent::Block(block) = event {
                self.ingest(block);
            }
        }

        drop(device);
        self.meter.publish(0.0, false);
    }
}
