use ndarray::Array2;

use crate::fft::FftPipeline;

/// Short-time Fourier transform producing a magnitude spectrogram.
///
/// Rows are frequency bins (row 0 = DC), columns are frames. Frames start
/// every `hop_length` samples; the last partial frame is zero-padded.
///
/// # Example
/// ```
/// use ss_audio::stft::Stft;
/// let mut stft = Stft::new(256, 128);
/// let mag = stft.magnitude(&vec![0.0f32; 1024]);
/// assert_eq!(mag.dim(), (129, 7));
/// ```
pub struct Stft {
    fft: FftPipeline,
    hop_length: usize,
}

impl Stft {
    /// Build an STFT with window `fft_size` and step `hop_length` (clamped
    /// to at least 1).
    #[must_use]
    pub fn new(fft_size: usize, hop_length: usize) -> Self {
        Self {
            fft: FftPipeline::new(fft_size),
            hop_length: hop_length.max(1),
        }
    }

    /// Number of frames produced for `len` samples.
    #[must_use]
    pub fn num_frames(&self, len: usize) -> usize {
        let size = self.fft.fft_size();
        if len <= size {
            1
        } else {
            1 + (len - size).div_ceil(self.hop_length)
        }
    }

    /// Magnitude spectrogram of `samples`.
    #[must_use]
    pub fn magnitude(&mut self, samples: &[f32]) -> Array2<f32> {
        let bins = self.fft.num_bins();
        let frames = self.num_frames(samples.len());
        let mut out = Array2::<f32>::zeros((bins, frames));
        let mut column = vec![0.0f32; bins];

        for frame in 0..frames {
            let start = (frame * self.hop_length).min(samples.len());
            let end = (start + self.fft.fft_size()).min(samples.len());
            self.fft.magnitude_into(&samples[start..end], &mut column);
            for (bin, &m) in column.iter().enumerate() {
                out[[bin, frame]] = m;
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_covers_tail() {
        let stft = Stft::new(256, 100);
        assert_eq!(stft.num_frames(0), 1);
        assert_eq!(stft.num_frames(256), 1);
        assert_eq!(stft.num_frames(257), 2);
        assert_eq!(stft.num_frames(556), 4);
    }

    #[test]
    fn magnitudes_non_negative() {
        let mut stft = Stft::new(128, 64);
        let samples: Vec<f32> = (0..2000).map(|i| ((i * 7919) % 97) as f32 / 48.0 - 1.0).collect();
        let mag = stft.magnitude(&samples);
        assert!(mag.iter().all(|&m| m >= 0.0 && m.is_finite()));
    }
}
