//! Sample-level processing applied during and after capture

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use rubato::{FftFixedIn, Resampler};
use thiserror::Error;

use super::config::AudioConfig;

const RESAMPLER_CHUNK: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    #[error("Invalid filter parameters: {0}")]
    Filter(String),

    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// Multiply samples by `gain`, clipping to [-1.0, 1.0]
pub fn apply_gain(samples: &mut [f32], gain: f32) {
    for sample in samples.iter_mut() {
        *sample = (*sample * gain).clamp(-1.0, 1.0);
    }
}

/// Average interleaved frames down to one channel
pub fn mix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Second-order Butterworth high-pass filter, run in place
pub fn high_pass(samples: &mut [f32], sample_rate: u32, cutoff_hz: f32) -> Result<(), ProcessingError> {
    let coeffs = Coefficients::<f32>::from_params(
        Type::HighPass,
        sample_rate.hz(),
        cutoff_hz.hz(),
        Q_BUTTERWORTH_F32,
    )
    .map_err(|e| {
        ProcessingError::Filter(format!("{:?} at {} Hz for {} Hz cutoff", e, sample_rate, cutoff_hz))
    })?;

    let mut filter = DirectForm2Transposed::<f32>::new(coeffs);
    for sample in samples.iter_mut() {
        *sample = filter.run(*sample);
    }
    Ok(())
}

/// Scale so the loudest sample sits at `headroom`.
///
/// Returns false and leaves the buffer untouched when it is silent.
pub fn normalize_peak(samples: &mut [f32], headroom: f32) -> bool {
    let peak = samples.iter().fold(0.0f32, |max, &s| max.max(s.abs()));
    if peak <= f32::EPSILON {
        return false;
    }

    let scale = headroom / peak;
    for sample in samples.iter_mut() {
        *sample *= scale;
    }
    true
}

/// Resample mono audio between rates
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>, ProcessingError> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;

    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        RESAMPLER_CHUNK,
        2,
        1,
    )
    .map_err(|e| ProcessingError::Resample(format!("resampler init failed: {}", e)))?;

    // The filter delays its output; those leading frames are dropped below
    let delay = resampler.output_delay();
    let wanted = output_len + delay;

    let mut output = Vec::with_capacity(wanted + RESAMPLER_CHUNK);
    let mut input_pos = 0;

    // Keep feeding (zero padding past the end) until enough output exists
    while input_pos < samples.len() || output.len() < wanted {
        let frames_needed = resampler.input_frames_next();
        let end_pos = (input_pos + frames_needed).min(samples.len());

        let mut chunk = samples[input_pos.min(end_pos)..end_pos].to_vec();
        chunk.resize(frames_needed, 0.0);
        let wave = vec![chunk];

        let resampled = resampler
            .process(&wave, None)
            .map_err(|e| ProcessingError::Resample(e.to_string()))?;
        match resampled.into_iter().next() {
            Some(channel) if !channel.is_empty() => output.extend(channel),
            _ if input_pos >= samples.len() => break,
            _ => {}
        }
        input_pos = end_pos;
    }

    output.drain(..delay.min(output.len()));
    output.resize(output_len, 0.0);
    Ok(output)
}

/// Post-capture pipeline: optional high-pass, peak normalisation, then
/// conversion from the device rate to the configured output rate.
pub fn finalize(
    mut samples: Vec<f32>,
    device_rate: u32,
    config: &AudioConfig,
) -> Result<Vec<f32>, ProcessingError> {
    if let Some(cutoff) = config.high_pass_hz() {
        if cutoff < device_rate as f32 / 2.0 {
            high_pass(&mut samples, device_rate, cutoff)?;
        } else {
            tracing::warn!(cutoff, device_rate, "high-pass cutoff above Nyquist, skipped");
        }
    }

    normalize_peak(&mut samples, config.headroom());

    let samples = resample(&samples, device_rate, config.sample_rate())?;
    // Resampling can overshoot slightly
    Ok(samples.into_iter().map(|s| s.clamp(-1.0, 1.0)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * amplitude)
            .collect()
    }

    #[test]
    fn gain_boosts_and_clips() {
        let mut samples = vec![0.2, -0.5, 0.9];
        apply_gain(&mut samples, 1.5);
        assert!((samples[0] - 0.3).abs() < 1e-6);
        assert!((samples[1] + 0.75).abs() < 1e-6);
        assert_eq!(samples[2], 1.0);
    }

    #[test]
    fn gain_attenuates_background() {
        let mut samples = vec![0.5, -0.5];
        apply_gain(&mut samples, 0.1);
        assert!((samples[0] - 0.05).abs() < 1e-6);
        assert!((samples[1] + 0.05).abs() < 1e-6);
    }

    #[test]
    fn mono_mixdown_averages_frames() {
        let stereo = vec![0.2, 0.4, -1.0, 1.0, 0.5, 0.5];
        let mono = mix_to_mono(&stereo, 2);
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert_eq!(mono[1], 0.0);
        assert_eq!(mono[2], 0.5);
    }

    #[test]
    fn mono_passthrough() {
        let samples = vec![0.1, 0.2];
        assert_eq!(mix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn high_pass_removes_dc() {
        let mut samples = vec![0.5; 16_000];
        high_pass(&mut samples, 16_000, 70.0).unwrap();
        let tail = &samples[8_000..];
        assert!(tail.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn high_pass_keeps_speech_band() {
        let mut samples = tone(1_000.0, 16_000, 16_000, 0.5);
        high_pass(&mut samples, 16_000, 70.0).unwrap();
        let peak = samples[8_000..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.45, "peak {}", peak);
    }

    #[test]
    fn high_pass_rejects_bad_cutoff() {
        let mut samples = vec![0.0; 10];
        assert!(matches!(
            high_pass(&mut samples, 16_000, 9_000.0),
            Err(ProcessingError::Filter(_))
        ));
    }

    #[test]
    fn normalize_scales_to_headroom() {
        let mut samples = vec![0.1, -0.3, 0.2];
        assert!(normalize_peak(&mut samples, 0.9));
        assert!((samples[1] + 0.9).abs() < 1e-6);
        assert!((samples[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn normalize_skips_silence() {
        let mut samples = vec![0.0; 100];
        assert!(!normalize_peak(&mut samples, 0.9));
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let samples = tone(440.0, 16_000, 500, 0.5);
        assert_eq!(resample(&samples, 16_000, 16_000).unwrap(), samples);
    }

    #[test]
    fn resample_down_produces_expected_length() {
        let samples = tone(440.0, 48_000, 4_800, 0.5);
        let out = resample(&samples, 48_000, 16_000).unwrap();
        assert_eq!(out.len(), 1_600);
    }

    #[test]
    fn resample_up_produces_expected_length() {
        let samples = tone(440.0, 8_000, 800, 0.5);
        let out = resample(&samples, 8_000, 16_000).unwrap();
        assert_eq!(out.len(), 1_600);
    }

    /// Index of the first sample louder than `threshold`
    fn onset(samples: &[f32], threshold: f32) -> usize {
        samples
            .iter()
            .position(|s| s.abs() > threshold)
            .unwrap_or(samples.len())
    }

    #[test]
    fn resample_keeps_timing_aligned() {
        let mut samples = vec![0.0; 4_800];
        samples.extend(tone(440.0, 48_000, 4_800, 0.5));

        let out = resample(&samples, 48_000, 16_000).unwrap();
        assert_eq!(out.len(), 3_200);
        let start = onset(&out, 0.1) as i64;
        assert!((start - 1_600).abs() <= 16, "onset at {}", start);
    }

    #[test]
    fn resample_keeps_the_end_of_the_utterance() {
        let mut samples = tone(440.0, 48_000, 4_800, 0.5);
        samples.extend(vec![0.0; 4_800]);

        let out = resample(&samples, 48_000, 16_000).unwrap();
        let reversed: Vec<f32> = out.iter().rev().copied().collect();
        let end = (out.len() - onset(&reversed, 0.1)) as i64;
        assert!((end - 1_600).abs() <= 16, "speech ends at {}", end);
    }

    #[test]
    fn finalize_normalizes_and_resamples() {
        let config = AudioConfig::builder()
            .sample_rate(16_000)
            .high_pass_hz(None)
            .build()
            .unwrap();
        let samples = tone(300.0, 48_000, 9_600, 0.2);
        let out = finalize(samples, 48_000, &config).unwrap();
        assert_eq!(out.len(), 3_200);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.7 && peak <= 1.0, "peak {}", peak);
    }

    #[test]
    fn finalize_keeps_silence_silent() {
        let config = AudioConfig::default();
        let out = finalize(vec![0.0; 1_024], 16_000, &config).unwrap();
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
