//! Speaker playback using rodio
//!
//! `rodio::OutputStream` is not `Send`, so each playback owns a thread that
//! opens the device, plays the buffer and releases the device when done.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tokio::sync::watch;

use crate::application::ports::{AudioOutput, PlaybackStream};
use crate::domain::audio::DecodedAudio;
use crate::domain::error::AudioDeviceError;

/// How often the playback thread checks for a stop request
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Default, Clone)]
pub struct RodioOutput;

impl RodioOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for RodioOutput {
    fn start(&self, audio: DecodedAudio) -> Result<Box<dyn PlaybackStream>, AudioDeviceError> {
        if audio.sample_rate == 0 || audio.channels == 0 {
            return Err(AudioDeviceError::UnsupportedFormat(format!(
                "{} Hz, {} channels",
                audio.sample_rate, audio.channels
            )));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let thread_stop = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                play_until_done(audio, thread_stop, ready_tx);
                done_tx.send_replace(true);
            })
            .map_err(|e| AudioDeviceError::Open(format!("failed to spawn output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(RodioPlayback { stop, done: done_rx })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioDeviceError::Open("output thread exited during startup".into())),
        }
    }
}

fn play_until_done(
    audio: DecodedAudio,
    stop: Arc<AtomicBool>,
    ready: std_mpsc::Sender<Result<(), AudioDeviceError>>,
) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(map_stream_error(e)));
            return;
        }
    };
    let sink = match Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(e) => {
            let _ = ready.send(Err(AudioDeviceError::Open(e.to_string())));
            return;
        }
    };

    tracing::debug!(
        sample_rate = audio.sample_rate,
        channels = audio.channels,
        frames = audio.frames(),
        "output stream opened"
    );
    sink.append(SamplesBuffer::new(audio.channels, audio.sample_rate, audio.samples));
    if ready.send(Ok(())).is_err() {
        sink.stop();
        return;
    }

    while !sink.empty() {
        if stop.load(Ordering::Acquire) {
            sink.stop();
            tracing::debug!("playback stopped early");
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    // Dropping the stream releases the device before completion is published
}

fn map_stream_error(err: rodio::StreamError) -> AudioDeviceError {
    match err {
        rodio::StreamError::NoDevice => AudioDeviceError::NoDevice,
        other => AudioDeviceError::Open(other.to_string()),
    }
}

struct RodioPlayback {
    stop: Arc<AtomicBool>,
    done: watch::Receiver<bool>,
}

#[async_trait]
impl PlaybackStream for RodioPlayback {
    fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    async fn finished(&self) {
        let mut done = self.done.clone();
        // Err means the thread is gone, which also means the device is free
        let _ = done.wait_for(|finished| *finished).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_format() {
        let audio = DecodedAudio {
            samples: vec![0.0; 16],
            sample_rate: 0,
            channels: 1,
        };
        assert!(matches!(
            RodioOutput::new().start(audio),
            Err(AudioDeviceError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn finished_resolves_when_thread_is_gone() {
        let (tx, rx) = watch::channel(false);
        let playback = RodioPlayback {
            stop: Arc::new(AtomicBool::new(false)),
            done: rx,
        };
        drop(tx);
        playback.finished().await;
    }

    #[tokio::test]
    #[ignore = "Requires audio hardware"]
    async fn plays_a_short_tone() {
        let samples = (0..1600)
            .map(|i| (i as f32 * 0.1).sin() * 0.2)
            .collect::<Vec<_>>();
        let stream = RodioOutput::new()
            .start(DecodedAudio {
                samples,
                sample_rate: 16_000,
                channels: 1,
            })
            .unwrap();
        stream.finished().await;
    }
}
