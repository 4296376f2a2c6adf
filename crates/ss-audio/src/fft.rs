use realfft::RealFftPlanner;

/// FFT pipeline: windowed real FFT using realfft.
///
/// Pre-allocates the FFT plan and scratch buffers so consecutive frames reuse
/// the same storage.
///
/// # Example
/// ```
/// use ss_audio::fft::FftPipeline;
/// let fft = FftPipeline::new(512);
/// assert_eq!(fft.num_bins(), 257);
/// ```
pub struct FftPipeline {
    fft_size: usize,
    input_buf: Vec<f32>,
    spectrum_buf: Vec<realfft::num_complex::Complex<f32>>,
    scratch: Vec<realfft::num_complex::Complex<f32>>,
    plan: std::sync::Arc<dyn realfft::RealToComplex<f32>>,
    /// Hann window coefficients (periodic).
    window: Vec<f32>,
}

impl FftPipeline {
    /// Create a new FFT pipeline with the given window size.
    ///
    /// # Panics
    /// Panics if `size` is 0. Config validation rejects a zero `fft_size`
    /// before any pipeline is built.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "FFT size must be > 0");

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);

        let input_buf = plan.make_input_vec();
        let spectrum_buf = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();

        let window: Vec<f32> = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
            .collect();

        Self {
            fft_size: size,
            input_buf,
            spectrum_buf,
            scratch,
            plan,
            window,
        }
    }

    /// Window `samples` (zero-padded to the FFT size) and write the magnitude
    /// spectrum into `out`, which must hold `num_bins()` values.
    ///
    /// # Example
    /// ```
    /// use ss_audio::fft::FftPipeline;
    /// let mut fft = FftPipeline::new(256);
    /// let mut out = vec![0.0f32; fft.num_bins()];
    /// fft.magnitude_into(&[0.0f32; 256], &mut out);
    /// assert!(out.iter().all(|&m| m == 0.0));
    /// ```
    pub fn magnitude_into(&mut self, samples: &[f32], out: &mut [f32]) {
        let n = self.fft_size.min(samples.len());

        for (i, slot) in self.input_buf.iter_mut().enumerate() {
            *slot = if i < n {
                samples[i] * self.window[i]
            } else {
                0.0
            };
        }

        if self
            .plan
            .process_with_scratch(&mut self.input_buf, &mut self.spectrum_buf, &mut self.scratch)
            .is_err()
        {
            out.iter_mut().for_each(|m| *m = 0.0);
            return;
        }

        for (slot, c) in out.iter_mut().zip(&self.spectrum_buf) {
            *slot = (c.re * c.re + c.im * c.im).sqrt();
        }
    }

    /// FFT window size.
    #[must_use]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins (N/2 + 1).
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_peaks_at_its_bin() {
        let size = 512;
        let mut fft = FftPipeline::new(size);
        // bin 32 of 512
        let samples: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * 32.0 * i as f32 / size as f32).sin())
            .collect();
        let mut out = vec![0.0; fft.num_bins()];
        fft.magnitude_into(&samples, &mut out);

        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(32));
    }

    #[test]
    fn short_input_is_zero_padded() {
        let mut fft = FftPipeline::new(64);
        let mut out = vec![1.0; fft.num_bins()];
        fft.magnitude_into(&[], &mut out);
        assert!(out.iter().all(|&m| m == 0.0));
    }
}
