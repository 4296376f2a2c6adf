use std::path::Path;

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::decode::decode_file;
use crate::error::AudioError;

/// Clip audio mono en mémoire.
///
/// # Example
/// ```
/// use ss_audio::audio::Audio;
/// let audio = Audio::new(vec![0.0; 22050], 22050);
/// assert!((audio.duration() - 1.0).abs() < 1e-9);
/// assert_eq!(audio.time_to_sample(0.5), 11025);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Audio {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Audio {
    /// Wrap mono samples.
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode a file, resampling to `sample_rate` when given.
    ///
    /// # Errors
    /// Returns an error if decoding or resampling fails.
    pub fn from_file(path: impl AsRef<Path>, sample_rate: Option<u32>) -> Result<Self> {
        let (samples, native_sr) = decode_file(path)?;
        let audio = Self::new(samples, native_sr);
        match sample_rate {
            Some(sr) if sr != native_sr => Ok(audio.resample(sr)?),
            _ => Ok(audio),
        }
    }

    /// Mono samples.
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Samples per second.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Sample index at time `t` seconds (floored).
    #[must_use]
    pub fn time_to_sample(&self, t: f64) -> usize {
        (t.max(0.0) * f64::from(self.sample_rate)) as usize
    }

    /// Extract `start..end` seconds.
    ///
    /// # Errors
    /// Returns `AudioError::InvalidWindow` if `start > end`, `start < 0`, or
    /// the window starts past the end of the clip.
    pub fn trim(&self, start: f64, end: f64) -> Result<Self, AudioError> {
        if start < 0.0 || start > end || start > self.duration() {
            return Err(AudioError::InvalidWindow { start, end });
        }
        let lo = self.time_to_sample(start).min(self.samples.len());
        let hi = self.time_to_sample(end).min(self.samples.len());
        Ok(Self::new(self.samples[lo..hi].to_vec(), self.sample_rate))
    }

    /// Repeat the clip until it is at least `duration` seconds long, then cut
    /// it to exactly that length.
    #[must_use]
    pub fn extend_to(&self, duration: f64) -> Self {
        let target = self.time_to_sample(duration);
        if self.samples.is_empty() || self.samples.len() >= target {
            return self.clone();
        }
        let samples = self.samples.iter().copied().cycle().take(target).collect();
        Self::new(samples, self.sample_rate)
    }

    /// Band-limited resampling to `target` Hz.
    ///
    /// # Errors
    /// Returns `AudioError::Resample` if rubato rejects the ratio.
    pub fn resample(&self, target: u32) -> Result<Self, AudioError> {
        if target == self.sample_rate || self.samples.is_empty() {
            return Ok(Self::new(self.samples.clone(), target));
        }

        let ratio = f64::from(target) / f64::from(self.sample_rate);
        let chunk_size = 1024usize;
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
            .map_err(|e| AudioError::Resample(e.to_string()))?;

        // le filtre retarde la sortie de `output_delay` trames
        let delay = resampler.output_delay();
        let expected = (self.samples.len() as f64 * ratio).round() as usize;
        let mut output = Vec::with_capacity(delay + expected + chunk_size);
        let mut process = |chunk: &[f32], output: &mut Vec<f32>| -> Result<(), AudioError> {
            let mut buf = vec![0.0f32; chunk_size];
            buf[..chunk.len()].copy_from_slice(chunk);
            let out = resampler
                .process(&[buf], None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            if let Some(channel) = out.first() {
                output.extend_from_slice(channel);
            }
            Ok(())
        };
        for chunk in self.samples.chunks(chunk_size) {
            process(chunk, &mut output)?;
        }
        while output.len() < delay + expected {
            process(&[], &mut output)?;
        }

        output.drain(..delay);
        output.truncate(expected);
        Ok(Self::new(output, target))
    }

    /// Write the clip as a 32-bit float mono WAV file.
    ///
    /// # Errors
    /// Returns `AudioError::Wav` if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AudioError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for &s in &self.samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
        Ok(())
    }
}
