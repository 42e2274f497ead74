//! Audio device port interfaces
//!
//! Input adapters deliver blocks through a [`BlockSink`], never by touching
//! session state. Output adapters play decoded audio and report completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::domain::audio::{AudioBlock, AudioConfig, DecodedAudio};
use crate::domain::error::AudioDeviceError;

/// An input device as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub default_sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Events delivered from the device callback to the capture task
#[derive(Debug)]
pub enum InputEvent {
    Block(AudioBlock),
    Fault { message: String, fatal: bool },
}

/// Producer half of the bounded channel between a device callback and the
/// capture task. Every method is non-blocking.
#[derive(Debug, Clone)]
pub struct BlockSink {
    tx: mpsc::Sender<InputEvent>,
    dropped: Arc<AtomicU64>,
}

impl BlockSink {
    /// Create a sink and the receiver the capture task reads from
    pub fn channel(capacity: usize) -> (Self, BlockReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        (
            Self {
                tx,
                dropped: Arc::clone(&dropped),
            },
            BlockReceiver { rx, dropped },
        )
    }

    /// Queue a block. Returns false when the block was dropped.
    pub fn push_block(&self, block: AudioBlock) -> bool {
        match self.tx.try_send(InputEvent::Block(block)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // First drop and then every 50th, the callback runs hundreds of times a second
                if dropped == 1 || dropped % 50 == 0 {
                    tracing::warn!(dropped, "capture channel full, dropping audio block");
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Report a stream fault. Fatal faults end the capture.
    pub fn fault(&self, message: impl Into<String>, fatal: bool) {
        let message = message.into();
        if let Err(e) = self.tx.try_send(InputEvent::Fault {
            message: message.clone(),
            fatal,
        }) {
            if matches!(e, TrySendError::Full(_)) {
                tracing::error!(%message, fatal, "capture channel full, stream fault not delivered");
            }
        }
    }

    /// Number of blocks dropped because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// True once the capture task has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of a [`BlockSink`] channel.
///
/// Holds no sender, so `recv` returns `None` once the adapter drops its sink.
#[derive(Debug)]
pub struct BlockReceiver {
    rx: mpsc::Receiver<InputEvent>,
    dropped: Arc<AtomicU64>,
}

impl BlockReceiver {
    pub async fn recv(&mut self) -> Option<InputEvent> {
        self.rx.recv().await
    }

    /// Take an already delivered event without waiting
    pub fn try_recv(&mut self) -> Option<InputEvent> {
        self.rx.try_recv().ok()
    }

    /// Refuse further events; queued ones stay readable
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// An open input stream.
///
/// Dropping the box without calling `close` also releases the device, but
/// only `close` guarantees the release has happened when it returns.
pub trait InputStream: Send {
    /// Rate the device actually delivers blocks at
    fn sample_rate(&self) -> u32;

    /// Stop the stream and block until the device is released
    fn close(self: Box<Self>);
}

/// Port for opening the capture device
pub trait AudioInput: Send + Sync {
    /// Open the configured (or default) input and start delivering blocks
    /// of `config.block_size()` mono samples into `sink`.
    ///
    /// May block while the driver starts; callers run it off the async runtime.
    fn open(
        &self,
        config: &AudioConfig,
        sink: BlockSink,
    ) -> Result<Box<dyn InputStream>, AudioDeviceError>;
}

/// Port for listing capture devices
pub trait DeviceEnumerator: Send + Sync {
    fn list_input_devices(&self) -> Result<Vec<DeviceInfo>, AudioDeviceError>;
}

/// A playback in progress
#[async_trait]
pub trait PlaybackStream: Send + Sync {
    /// Stop immediately. Idempotent.
    fn stop(&self);

    /// Resolves once playback has ended (naturally or by `stop`) and the
    /// output device has been released.
    async fn finished(&self);
}

/// Port for the playback device
pub trait AudioOutput: Send + Sync {
    fn start(&self, audio: DecodedAudio) -> Result<Box<dyn PlaybackStream>, AudioDeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn block() -> AudioBlock {
        AudioBlock::new(vec![0.0; 4], 16_000, Instant::now())
    }

    #[tokio::test]
    async fn sink_delivers_in_order() {
        let (sink, mut rx) = BlockSink::channel(4);
        sink.push_block(AudioBlock::new(vec![1.0], 16_000, Instant::now()));
        sink.push_block(AudioBlock::new(vec![2.0], 16_000, Instant::now()));

        for expected in [1.0, 2.0] {
            match rx.recv().await {
                Some(InputEvent::Block(b)) => assert_eq!(b.samples(), &[expected]),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn overflow_is_counted_not_blocking() {
        let (sink, rx) = BlockSink::channel(2);
        assert!(sink.push_block(block()));
        assert!(sink.push_block(block()));
        assert!(!sink.push_block(block()));
        assert!(!sink.push_block(block()));
        assert_eq!(sink.dropped(), 2);
        assert_eq!(rx.dropped(), 2);
    }

    #[tokio::test]
    async fn closed_receiver_is_detected() {
        let (sink, rx) = BlockSink::channel(2);
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.push_block(block()));
        assert_eq!(sink.dropped(), 0);
    }

    #[tokio::test]
    async fn receiver_ends_when_sink_dropped() {
        let (sink, mut rx) = BlockSink::channel(2);
        sink.push_block(block());
        drop(sink);
        assert!(matches!(rx.recv().await, Some(InputEvent::Block(_))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn faults_are_delivered() {
        let (sink, mut rx) = BlockSink::channel(2);
        sink.fault("device unplugged", true);
        match rx.recv().await {
            Some(InputEvent::Fault { message, fatal }) => {
                assert_eq!(message, "device unplugged");
                assert!(fatal);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
