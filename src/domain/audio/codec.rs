//! WAV container encoding and decoding

use std::io::Cursor;

use crate::domain::error::FormatError;

use super::block::EncodedAudio;

const PCM16_SCALE: f32 = i16::MAX as f32;
const PCM16_DECODE_SCALE: f32 = 32_768.0;

/// Interleaved float samples with their stream parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Stream parameters assumed for headerless PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmDefaults {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmDefaults {
    fn default() -> Self {
        Self {
            sample_rate: super::config::DEFAULT_SAMPLE_RATE,
            channels: super::config::DEFAULT_CHANNELS,
        }
    }
}

fn read_error(e: hound::Error) -> FormatError {
    match e {
        hound::Error::Unsupported | hound::Error::InvalidSampleFormat | hound::Error::TooWide => {
            FormatError::Unsupported(e.to_string())
        }
        other => FormatError::Malformed(other.to_string()),
    }
}

fn write_error(e: hound::Error) -> FormatError {
    FormatError::Write(e.to_string())
}

pub struct AudioCodec;

impl AudioCodec {
    /// Encode float samples as 16-bit PCM WAV.
    ///
    /// Samples are clamped to [-1.0, 1.0] before quantisation.
    pub fn encode(
        samples: &[f32],
        sample_rate: u32,
        channels: u16,
    ) -> Result<EncodedAudio, FormatError> {
        if sample_rate == 0 || channels == 0 {
            return Err(FormatError::Write(format!(
                "invalid stream parameters: {} Hz, {} channels",
                sample_rate, channels
            )));
        }

        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut data = Vec::with_capacity(44 + samples.len() * 2);
        {
            let mut writer =
                hound::WavWriter::new(Cursor::new(&mut data), spec).map_err(write_error)?;
            for &sample in samples {
                writer.write_sample(quantize(sample)).map_err(write_error)?;
            }
            writer.finalize().map_err(write_error)?;
        }

        Ok(EncodedAudio::new(data))
    }

    /// Decode a WAV container holding 16-bit integer or 32-bit float samples
    pub fn decode(bytes: &[u8]) -> Result<DecodedAudio, FormatError> {
        let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(read_error)?;
        let spec = reader.spec();

        let samples = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => reader
                .into_samples::<i16>()
                .map(|s| s.map(|v| v as f32 / PCM16_DECODE_SCALE))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(read_error)?,
            (hound::SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<f32>, _>>()
                .map_err(read_error)?,
            (format, bits) => {
                return Err(FormatError::Unsupported(format!(
                    "{}-bit {:?} samples",
                    bits, format
                )))
            }
        };

        Ok(DecodedAudio {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    /// Decode a WAV container, treating the bytes as raw little-endian
    /// 16-bit PCM when no usable header is present.
    pub fn decode_or_raw(bytes: &[u8], defaults: PcmDefaults) -> DecodedAudio {
        match Self::decode(bytes) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, bytes = bytes.len(), "playing as raw PCM");
                Self::decode_raw(bytes, defaults)
            }
        }
    }

    /// Interpret bytes as raw little-endian 16-bit PCM. A trailing odd byte is dropped.
    pub fn decode_raw(bytes: &[u8], defaults: PcmDefaults) -> DecodedAudio {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_DECODE_SCALE)
            .collect();

        DecodedAudio {
            samples,
            sample_rate: defaults.sample_rate,
            channels: defaults.channels,
        }
    }
}

fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * PCM16_SCALE).round() as i16
}
