use anyhow::Result;
use image::{GrayImage, Luma};
use rand::Rng;

use crate::action::{Action, ActionContext};
use crate::sample::Sample;

/// Random brightness then contrast change.
///
/// Each factor is drawn uniformly from `[1 - x, 1 + x]`. Contrast blends
/// every pixel with the image mean.
#[derive(Clone, Debug)]
pub struct ColorJitter {
    /// Brightness spread.
    pub brightness: f32,
    /// Contrast spread.
    pub contrast: f32,
}

impl Default for ColorJitter {
    fn default() -> Self {
        Self { brightness: 0.3, contrast: 0.3 }
    }
}

fn factor(spread: f32, rng: &mut impl Rng) -> f32 {
    if spread > 0.0 {
        rng.gen_range((1.0 - spread).max(0.0)..=1.0 + spread)
    } else {
        1.0
    }
}

impl ColorJitter {
    /// Apply fixed brightness and contrast factors.
    #[must_use]
    pub fn adjust(img: &GrayImage, brightness: f32, contrast: f32) -> GrayImage {
        let bright: Vec<f32> = img
            .as_raw()
            .iter()
            .map(|&p| (f32::from(p) * brightness).clamp(0.0, 255.0))
            .collect();
        let mean = if bright.is_empty() {
            0.0
        } else {
            bright.iter().sum::<f32>() / bright.len() as f32
        };
        let raw = bright
            .iter()
            .map(|&p| (mean + contrast * (p - mean)).clamp(0.0, 255.0).round() as u8)
            .collect();
        GrayImage::from_raw(img.width(), img.height(), raw)
            .unwrap_or_else(|| GrayImage::new(img.width(), img.height()))
    }
}

impl Action for ColorJitter {
    fn name(&self) -> &'static str {
        "color_jitter"
    }

    fn apply(&self, sample: Sample, ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let img = sample.into_image(self.name())?;
        let b = factor(self.brightness, ctx.rng);
        let c = factor(self.contrast, ctx.rng);
        Ok(Sample::Image(Self::adjust(&img, b, c)))
    }
}

/// Random translation, no rotation.
///
/// Shifts are drawn from `±translate.0 * width` and `±translate.1 * height`;
/// uncovered pixels take `fill`.
#[derive(Clone, Debug)]
pub struct RandomAffine {
    /// Maximum horizontal and vertical shift as image fractions.
    pub translate: (f32, f32),
    /// Gray level of uncovered pixels.
    pub fill: u8,
}

impl Default for RandomAffine {
    fn default() -> Self {
        Self { translate: (0.2, 0.03), fill: 50 }
    }
}

impl RandomAffine {
    /// Shift `img` by `(dx, dy)` pixels.
    #[must_use]
    pub fn shift(img: &GrayImage, dx: i64, dy: i64, fill: u8) -> GrayImage {
        let (w, h) = (i64::from(img.width()), i64::from(img.height()));
        GrayImage::from_fn(img.width(), img.height(), |x, y| {
            let sx = i64::from(x) - dx;
            let sy = i64::from(y) - dy;
            if (0..w).contains(&sx) && (0..h).contains(&sy) {
                *img.get_pixel(sx as u32, sy as u32)
            } else {
                Luma([fill])
            }
        })
    }
}

fn offset(fraction: f32, size: u32, rng: &mut impl Rng) -> i64 {
    let max = (fraction * size as f32).abs();
    if max > 0.0 {
        rng.gen_range(-max..=max).round() as i64
    } else {
        0
    }
}

impl Action for RandomAffine {
    fn name(&self) -> &'static str {
        "random_affine"
    }

    fn apply(&self, sample: Sample, ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let img = sample.into_image(self.name())?;
        let dx = offset(self.translate.0, img.width(), ctx.rng);
        let dy = offset(self.translate.1, img.height(), ctx.rng);
        Ok(Sample::Image(Self::shift(&img, dx, dy, self.fill)))
    }
}
