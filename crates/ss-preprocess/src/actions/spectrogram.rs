use anyhow::Result;
use image::{GrayImage, Luma};
use ss_audio::stft::Stft;

use crate::action::{Action, ActionContext};
use crate::resize::GrayResizer;
use crate::sample::{DecibelSpectrogram, Sample};

/// Range the dB spectrogram is clipped to, `(floor, ceiling)`.
pub const DECIBEL_LIMITS: (f32, f32) = (-100.0, -20.0);

/// Audio in, dB spectrogram out.
///
/// Magnitudes are scaled by the window length before conversion, then
/// clipped to [`DECIBEL_LIMITS`].
#[derive(Clone, Debug)]
pub struct AudioToSpectrogram {
    /// STFT window length.
    pub fft_size: usize,
    /// STFT hop.
    pub hop_length: usize,
}

impl Action for AudioToSpectrogram {
    fn name(&self) -> &'static str {
        "to_spec"
    }

    fn apply(&self, sample: Sample, _ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let audio = sample.into_audio(self.name())?;
        let mut stft = Stft::new(self.fft_size, self.hop_length);
        let scale = self.fft_size as f32;
        let (lo, hi) = DECIBEL_LIMITS;
        let values = stft
            .magnitude(audio.samples())
            .mapv(|m| (20.0 * (m / scale).max(f32::MIN_POSITIVE).log10()).clamp(lo, hi));
        Ok(Sample::Spectrogram(DecibelSpectrogram { values }))
    }
}

/// dB spectrogram in, `width` x `height` grayscale image out.
///
/// Loud bins map to dark pixels and high frequencies sit at the top.
#[derive(Clone, Debug)]
pub struct SpecToImg {
    /// Output width.
    pub width: u32,
    /// Output height.
    pub height: u32,
}

impl SpecToImg {
    /// Build for a fixed output size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Unresized image of `spec`, one pixel per bin.
    #[must_use]
    pub fn render(spec: &DecibelSpectrogram) -> GrayImage {
        let (lo, hi) = DECIBEL_LIMITS;
        let (bins, frames) = spec.values.dim();
        GrayImage::from_fn(frames as u32, bins as u32, |x, y| {
            let db = spec.values[[bins - 1 - y as usize, x as usize]].clamp(lo, hi);
            Luma([(255.0 * (hi - db) / (hi - lo)).round() as u8])
        })
    }
}

impl Action for SpecToImg {
    fn name(&self) -> &'static str {
        "to_img"
    }

    fn apply(&self, sample: Sample, _ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let spec = sample.into_spectrogram(self.name())?;
        let raw = Self::render(&spec);
        let img = GrayResizer::new().resize(&raw, self.width, self.height)?;
        Ok(Sample::Image(img))
    }
}
