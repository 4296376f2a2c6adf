use std::path::PathBuf;

use anyhow::Result;
use ss_audio::segmentation::spect_gen_file;
use ss_core::config::SpectrogramParams;
use ss_core::{BoxTable, Spectrogram, SpectrogramSource};

/// Computes spectrograms on demand from the audio under `data_dir`.
///
/// Labels are paths relative to `data_dir`.
pub struct ComputedSpectrograms {
    data_dir: PathBuf,
    params: SpectrogramParams,
}

impl ComputedSpectrograms {
    /// Source reading audio from `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, params: SpectrogramParams) -> Self {
        Self {
            data_dir: data_dir.into(),
            params,
        }
    }
}

impl SpectrogramSource for ComputedSpectrograms {
    fn load(&self, label: &str) -> Result<(BoxTable, Spectrogram)> {
        spect_gen_file(&self.data_dir.join(label), &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss_audio::Audio;

    #[test]
    fn computes_from_wav_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sr = 8000;
        let tone: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 2000.0 * i as f32 / sr as f32).sin())
            .collect();
        Audio::new(tone, sr).save(dir.path().join("tone.wav")).unwrap();

        let params = SpectrogramParams {
            sample_rate: sr,
            fft_size: 128,
            hop_length: 64,
            ..SpectrogramParams::default()
        };
        let source = ComputedSpectrograms::new(dir.path(), params);
        let (boxes, spec) = source.load("tone.wav").unwrap();
        assert_eq!(spec.height(), 65);
        assert!(!boxes.is_empty());
        assert!(source.load("missing.wav").is_err());
    }
}
