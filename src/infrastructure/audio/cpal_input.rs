//! Microphone capture using cpal
//!
//! Each open stream lives on its own thread, since `cpal::Stream` is not
//! `Send` on every platform. The device callback converts whatever the
//! hardware delivers into mono f32 blocks and hands them to the sink.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use crate::application::ports::{AudioInput, BlockSink, DeviceEnumerator, DeviceInfo, InputStream};
use crate::domain::audio::{processing, AudioBlock, AudioConfig};
use crate::domain::error::AudioDeviceError;

/// Capture adapter for the host's default audio backend
#[derive(Debug, Default, Clone)]
pub struct CpalInput;

impl CpalInput {
    pub fn new() -> Self {
        Self
    }

    fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, AudioDeviceError> {
        match name {
            Some(name) => host
                .input_devices()
                .map_err(|e| AudioDeviceError::Open(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioDeviceError::DeviceNotFound(name.to_string())),
            None => host.default_input_device().ok_or(AudioDeviceError::NoDevice),
        }
    }

    /// Prefer a supported range that includes the target rate, fewest channels first.
    /// Falls back to the device default when nothing matches.
    fn choose_config(
        device: &cpal::Device,
        target_rate: u32,
    ) -> Result<(StreamConfig, SampleFormat), AudioDeviceError> {
        let usable = |format: SampleFormat| {
            matches!(format, SampleFormat::I16 | SampleFormat::U16 | SampleFormat::F32)
        };

        let best = device
            .supported_input_configs()
            .map_err(map_supported_error)?
            .filter(|range| usable(range.sample_format()))
            .filter(|range| {
                range.min_sample_rate().0 <= target_rate && range.max_sample_rate().0 >= target_rate
            })
            .min_by_key(|range| range.channels());

        if let Some(range) = best {
            let format = range.sample_format();
            let config = range.with_sample_rate(SampleRate(target_rate)).config();
            return Ok((config, format));
        }

        let default = device.default_input_config().map_err(map_default_error)?;
        let format = default.sample_format();
        if !usable(format) {
            return Err(AudioDeviceError::UnsupportedFormat(format!("{:?}", format)));
        }
        Ok((default.config(), format))
    }

    /// Open the stream on the calling thread and run it until `stop` fires.
    fn run_stream(
        config: AudioConfig,
        sink: BlockSink,
        ready: std_mpsc::Sender<Result<u32, AudioDeviceError>>,
        stop: std_mpsc::Receiver<()>,
    ) {
        let stream = match Self::build_stream(&config, sink) {
            Ok((stream, rate)) => {
                if ready.send(Ok(rate)).is_err() {
                    return;
                }
                stream
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        // Returns on an explicit stop or when the handle is dropped
        let _ = stop.recv();

        if let Err(e) = stream.pause() {
            tracing::debug!(error = %e, "failed to pause input stream");
        }
        drop(stream);
        tracing::debug!("input stream released");
    }

    fn build_stream(
        config: &AudioConfig,
        sink: BlockSink,
    ) -> Result<(cpal::Stream, u32), AudioDeviceError> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, config.device())?;
        let (stream_config, format) = Self::choose_config(&device, config.sample_rate())?;
        let device_rate = stream_config.sample_rate.0;
        let channels = usize::from(stream_config.channels.max(1));

        // Keep block duration constant when the device runs at another rate
        let block_samples = ((config.block_size() as u64 * device_rate as u64)
            / config.sample_rate().max(1) as u64)
            .max(1) as usize;

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            format = ?format,
            sample_rate = device_rate,
            channels,
            block_samples,
            "opening input stream"
        );

        // Only one arm below runs, and its callback owns the dispatcher
        let dispatcher = BlockDispatcher::new(block_samples, device_rate, channels, sink.clone());
        let err_sink = sink;
        let on_error = move |err: cpal::StreamError| {
            let fatal = matches!(err, cpal::StreamError::DeviceNotAvailable);
            tracing::warn!(error = %err, fatal, "input stream error");
            err_sink.fault(err.to_string(), fatal);
        };

        let stream = match format {
            SampleFormat::F32 => {
                let mut feed = dispatcher.into_callback::<f32>(|s| s);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| feed(data),
                    on_error,
                    None,
                )
            }
            SampleFormat::I16 => {
                let mut feed = dispatcher.into_callback::<i16>(|s| s as f32 / 32_768.0);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| feed(data),
                    on_error,
                    None,
                )
            }
            SampleFormat::U16 => {
                let mut feed = dispatcher.into_callback::<u16>(|s| (s as f32 - 32_768.0) / 32_768.0);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| feed(data),
                    on_error,
                    None,
                )
            }
            other => return Err(AudioDeviceError::UnsupportedFormat(format!("{:?}", other))),
        }
        .map_err(map_build_error)?;

        stream.play().map_err(map_play_error)?;
        Ok((stream, device_rate))
    }
}

impl AudioInput for CpalInput {
    fn open(
        &self,
        config: &AudioConfig,
        sink: BlockSink,
    ) -> Result<Box<dyn InputStream>, AudioDeviceError> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let config = config.clone();

        let thread = std::thread::Builder::new()
            .name("audio-input".into())
            .spawn(move || CpalInput::run_stream(config, sink, ready_tx, stop_rx))
            .map_err(|e| AudioDeviceError::Open(format!("failed to spawn input thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => Ok(Box::new(CpalStream {
                sample_rate,
                stop: stop_tx,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioDeviceError::Open("input thread exited during startup".into()))
            }
        }
    }
}

impl DeviceEnumerator for CpalInput {
    fn list_input_devices(&self) -> Result<Vec<DeviceInfo>, AudioDeviceError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let devices = host
            .input_devices()
            .map_err(|e| AudioDeviceError::Open(e.to_string()))?;

        Ok(devices
            .filter_map(|device| {
                let name = device.name().ok()?;
                let default_config = device.default_input_config().ok();
                Some(DeviceInfo {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    default_sample_rate: default_config.as_ref().map(|c| c.sample_rate().0),
                    channels: default_config.as_ref().map(|c| c.channels()),
                    name,
                })
            })
            .collect())
    }
}

/// Handle to a stream running on its own thread
struct CpalStream {
    sample_rate: u32,
    stop: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl InputStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(mut self: Box<Self>) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("input thread panicked");
            }
        }
    }
}

/// Cuts callback data into fixed-size mono blocks
struct BlockDispatcher {
    block_samples: usize,
    sample_rate: u32,
    channels: usize,
    pending: Vec<f32>,
    scratch: Vec<f32>,
    sink: BlockSink,
}

impl BlockDispatcher {
    fn new(block_samples: usize, sample_rate: u32, channels: usize, sink: BlockSink) -> Self {
        Self {
            block_samples: block_samples.max(1),
            sample_rate,
            channels: channels.max(1),
            pending: Vec::with_capacity(block_samples * 2),
            scratch: Vec::new(),
            sink,
        }
    }

    /// Hand the dispatcher over to a device callback
    fn into_callback<T: Copy + 'static>(
        mut self,
        convert: fn(T) -> f32,
    ) -> impl FnMut(&[T]) + Send + 'static {
        move |data: &[T]| self.push(data, convert)
    }

    fn push<T, F>(&mut self, data: &[T], convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        if self.sink.is_closed() {
            return;
        }

        if self.channels == 1 {
            self.pending.extend(data.iter().copied().map(convert));
        } else {
            self.scratch.clear();
            self.scratch.extend(data.iter().copied().map(convert));
            self.pending
                .extend(processing::mix_to_mono(&self.scratch, self.channels as u16));
        }

        while self.pending.len() >= self.block_samples {
            let samples: Vec<f32> = self.pending.drain(..self.block_samples).collect();
            self.sink
                .push_block(AudioBlock::new(samples, self.sample_rate, Instant::now()));
        }
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> AudioDeviceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => AudioDeviceError::NoDevice,
        cpal::BuildStreamError::StreamConfigNotSupported => {
            AudioDeviceError::UnsupportedFormat("stream configuration not supported".into())
        }
        cpal::BuildStreamError::BackendSpecific { err } => backend_error(err.description),
        other => AudioDeviceError::Open(other.to_string()),
    }
}

fn map_play_error(err: cpal::PlayStreamError) -> AudioDeviceError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => AudioDeviceError::NoDevice,
        cpal::PlayStreamError::BackendSpecific { err } => backend_error(err.description),
    }
}

fn map_supported_error(err: cpal::SupportedStreamConfigsError) -> AudioDeviceError {
    match err {
        cpal::SupportedStreamConfigsError::DeviceNotAvailable => AudioDeviceError::NoDevice,
        other => AudioDeviceError::Open(other.to_string()),
    }
}

fn map_default_error(err: cpal::DefaultStreamConfigError) -> AudioDeviceError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => AudioDeviceError::NoDevice,
        cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
            AudioDeviceError::UnsupportedFormat("device has no input stream".into())
        }
        other => AudioDeviceError::Open(other.to_string()),
    }
}

/// Backends report permission problems only as text
fn backend_error(description: String) -> AudioDeviceError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        AudioDeviceError::PermissionDenied
    } else if lower.contains("busy") || lower.contains("in use") {
        AudioDeviceError::Busy
    } else {
        AudioDeviceError::Open(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::InputEvent;

    fn collect(rx: &mut crate::application::ports::BlockReceiver) -> Vec<Vec<f32>> {
        let mut blocks = Vec::new();
        while let Some(event) = rx.try_recv() {
            if let InputEvent::Block(block) = event {
                assert_eq!(block.sample_rate(), 16_000);
                blocks.push(block.into_samples());
            }
        }
        blocks
    }

    #[test]
    fn dispatcher_emits_whole_blocks_only() {
        let (sink, mut rx) = BlockSink::channel(16);
        let mut dispatcher = BlockDispatcher::new(4, 16_000, 1, sink);

        dispatcher.push(&[0.1f32, 0.2, 0.3], |s| s);
        assert!(collect(&mut rx).is_empty());

        dispatcher.push(&[0.4f32, 0.5, 0.6, 0.7, 0.8, 0.9], |s| s);
        let blocks = collect(&mut rx);
        assert_eq!(blocks, vec![vec![0.1, 0.2, 0.3, 0.4], vec![0.5, 0.6, 0.7, 0.8]]);
    }

    #[test]
    fn callback_never_skips_data() {
        let (sink, mut rx) = BlockSink::channel(1024);
        let mut feed =
            BlockDispatcher::new(4, 16_000, 1, sink).into_callback::<i16>(|s| s as f32);

        for i in 0..100i16 {
            feed(&[i, i, i]);
        }

        let blocks = collect(&mut rx);
        assert_eq!(blocks.len(), 75);
        let flat: Vec<f32> = blocks.into_iter().flatten().collect();
        assert_eq!(flat[0..3], [0.0, 0.0, 0.0]);
        assert_eq!(flat[297..300], [99.0, 99.0, 99.0]);
    }

    #[test]
    fn dispatcher_downmixes_and_converts() {
        let (sink, mut rx) = BlockSink::channel(16);
        let mut dispatcher = BlockDispatcher::new(2, 16_000, 2, sink);

        dispatcher.push(&[16_384i16, 16_384, -16_384, 0], |s| s as f32 / 32_768.0);
        let blocks = collect(&mut rx);
        assert_eq!(blocks, vec![vec![0.5, -0.25]]);
    }

    #[test]
    fn dispatcher_stops_when_receiver_gone() {
        let (sink, rx) = BlockSink::channel(16);
        let mut dispatcher = BlockDispatcher::new(1, 16_000, 1, sink.clone());
        drop(rx);

        dispatcher.push(&[0.1f32, 0.2], |s| s);
        assert!(dispatcher.pending.is_empty());
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn backend_errors_are_classified() {
        assert_eq!(
            backend_error("Permission denied by system".into()),
            AudioDeviceError::PermissionDenied
        );
        assert_eq!(backend_error("Device or resource busy".into()), AudioDeviceError::Busy);
        assert_eq!(
            backend_error("snd_pcm_open failed".into()),
            AudioDeviceError::Open("snd_pcm_open failed".into())
        );
    }

    #[test]
    fn build_errors_map_to_device_errors() {
        assert_eq!(
            map_build_error(cpal::BuildStreamError::DeviceNotAvailable),
            AudioDeviceError::NoDevice
        );
        assert!(matches!(
            map_build_error(cpal::BuildStreamError::StreamConfigNotSupported),
            AudioDeviceError::UnsupportedFormat(_)
        ));
    }

    #[test]
    #[ignore = "Requires audio hardware"]
    fn lists_input_devices() {
        let devices = CpalInput::new().list_input_devices().unwrap();
        assert!(devices.iter().filter(|d| d.is_default).count() <= 1);
    }
}
