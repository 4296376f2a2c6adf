use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, ensure};
use image::{GrayImage, Luma};
use ndarray::{Array2, Array3, Axis, s};
use rand::Rng;

use crate::action::{Action, ActionContext};
use crate::sample::{Sample, Tensor};

/// Grayscale image in, `(3, height, width)` tensor in `[0, 1]` out.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImgToTensor;

impl Action for ImgToTensor {
    fn name(&self) -> &'static str {
        "to_tensor"
    }

    fn apply(&self, sample: Sample, _ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let img = sample.into_image(self.name())?;
        let (w, h) = img.dimensions();
        let data = Array3::from_shape_fn((3, h as usize, w as usize), |(_, y, x)| {
            f32::from(img.get_pixel(x as u32, y as u32).0[0]) / 255.0
        });
        Ok(Sample::Tensor(Tensor::new(data)))
    }
}

/// `(x - mean) / std` on every channel.
#[derive(Clone, Copy, Debug)]
pub struct TensorNormalize {
    /// Subtracted mean.
    pub mean: f32,
    /// Divisor, > 0.
    pub std: f32,
}

impl Action for TensorNormalize {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn apply(&self, sample: Sample, _ctx: &mut ActionContext<'_>) -> Result<Sample> {
        ensure!(self.std > 0.0, "std must be positive, got {}", self.std);
        let mut t = sample.into_tensor(self.name())?;
        let (mean, std) = (self.mean, self.std);
        t.data.mapv_inplace(|v| (v - mean) / std);
        Ok(Sample::Tensor(t))
    }
}

/// SpecAugment-style augmentation on channel 0, replicated to 3 channels.
///
/// Rows are frequencies and columns are time frames.
#[derive(Clone, Copy, Debug)]
pub struct TensorAugment {
    /// Maximum time-warp distance in columns.
    pub time_warp: usize,
    /// Maximum width of one time mask.
    pub time_mask: usize,
    /// Maximum height of one frequency mask.
    pub freq_mask: usize,
    /// Maximum number of masks of each kind.
    pub max_masks: usize,
}

impl Default for TensorAugment {
    fn default() -> Self {
        Self {
            time_warp: 10,
            time_mask: 50,
            freq_mask: 50,
            max_masks: 5,
        }
    }
}

/// Piecewise-linear warp moving column `center` to `center + shift`.
#[must_use]
pub fn time_warp(plane: &Array2<f32>, center: usize, shift: i64) -> Array2<f32> {
    let (h, w) = plane.dim();
    if w < 2 {
        return plane.clone();
    }
    let last = (w - 1) as f32;
    let c = center as f32;
    let moved = (c + shift as f32).clamp(0.0, last);
    Array2::from_shape_fn((h, w), |(y, x)| {
        let x = x as f32;
        let src = if x <= moved {
            if moved > 0.0 { x * c / moved } else { 0.0 }
        } else if moved < last {
            c + (x - moved) * (last - c) / (last - moved)
        } else {
            last
        };
        let lo = src.floor().clamp(0.0, last) as usize;
        let hi = (lo + 1).min(w - 1);
        let frac = src - lo as f32;
        plane[[y, lo]] * (1.0 - frac) + plane[[y, hi]] * frac
    })
}

/// Fill up to `max_masks` random bands of at most `max_width` along `axis`
/// with `fill`.
pub fn random_masks(
    plane: &mut Array2<f32>,
    axis: Axis,
    max_width: usize,
    max_masks: usize,
    fill: f32,
    rng: &mut impl Rng,
) {
    let len = plane.len_of(axis);
    if max_masks == 0 || len == 0 {
        return;
    }
    for _ in 0..rng.gen_range(1..=max_masks) {
        let width = rng.gen_range(0..=max_width.min(len));
        let start = rng.gen_range(0..=len - width);
        plane
            .slice_axis_mut(axis, (start..start + width).into())
            .fill(fill);
    }
}

impl Action for TensorAugment {
    fn name(&self) -> &'static str {
        "tensor_aug"
    }

    fn apply(&self, sample: Sample, ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let t = sample.into_tensor(self.name())?;
        let (_, h, w) = t.shape();
        let mut plane = t.data.slice(s![0, .., ..]).to_owned();

        if self.time_warp > 0 && w > 2 * self.time_warp {
            let center = ctx.rng.gen_range(self.time_warp..w - self.time_warp);
            let reach = self.time_warp as i64;
            let shift = ctx.rng.gen_range(-reach..=reach);
            plane = time_warp(&plane, center, shift);
        }
        let fill = plane.mean().unwrap_or(0.0);
        random_masks(&mut plane, Axis(1), self.time_mask, self.max_masks, fill, ctx.rng);
        random_masks(&mut plane, Axis(0), self.freq_mask, self.max_masks, fill, ctx.rng);

        let data = Array3::from_shape_fn((3, h, w), |(_, y, x)| plane[[y, x]]);
        Ok(Sample::Tensor(Tensor::new(data)))
    }
}

/// Standard normal draw (Box-Muller).
pub fn standard_normal(rng: &mut impl Rng) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

/// Additive Gaussian noise with standard deviation `std`.
#[derive(Clone, Copy, Debug)]
pub struct TensorAddNoise {
    /// Noise standard deviation.
    pub std: f32,
}

impl Action for TensorAddNoise {
    fn name(&self) -> &'static str {
        "add_noise"
    }

    fn apply(&self, sample: Sample, ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let mut t = sample.into_tensor(self.name())?;
        ensure!(
            self.std.is_finite() && self.std >= 0.0,
            "invalid noise std {}",
            self.std
        );
        let std = self.std;
        t.data.mapv_inplace(|v| v + std * standard_normal(&mut *ctx.rng));
        Ok(Sample::Tensor(t))
    }
}

/// Writes channel 0 of the tensor as `{stem}_{millis}.png` under `dir` and
/// passes the sample through unchanged.
#[derive(Clone, Debug)]
pub struct SaveTensorToDisk {
    /// Output directory, created on first use.
    pub dir: PathBuf,
}

impl Action for SaveTensorToDisk {
    fn name(&self) -> &'static str {
        "save_img"
    }

    fn apply(&self, sample: Sample, ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let t = sample.into_tensor(self.name())?;
        let (_, h, w) = t.shape();
        let img = GrayImage::from_fn(w as u32, h as u32, |x, y| {
            let v = t.data[[0, y as usize, x as usize]].clamp(0.0, 1.0);
            Luma([(v * 255.0).round() as u8])
        });

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let stem = ctx
            .path
            .file_stem()
            .map_or_else(|| "sample".into(), |s| s.to_string_lossy());
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let out = self.dir.join(format!("{stem}_{millis}.png"));
        img.save(&out)
            .with_context(|| format!("writing {}", out.display()))?;
        log::debug!("saved {}", out.display());
        Ok(Sample::Tensor(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::path::Path;

    fn ctx_run(action: &dyn Action, sample: Sample, seed: u64) -> Sample {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ctx = ActionContext { path: Path::new("clip.wav"), rng: &mut rng };
        action.apply(sample, &mut ctx).unwrap()
    }

    #[test]
    fn image_to_tensor_scales_and_replicates() {
        let img = GrayImage::from_fn(3, 2, |x, _| Luma([if x == 1 { 255 } else { 0 }]));
        let t = ctx_run(&ImgToTensor, Sample::Image(img), 0).into_tensor("t").unwrap();
        assert_eq!(t.shape(), (3, 2, 3));
        for c in 0..3 {
            assert_eq!(t.data[[c, 1, 1]], 1.0);
            assert_eq!(t.data[[c, 0, 0]], 0.0);
        }
    }

    #[test]
    fn normalize_maps_half_to_zero() {
        let t = Tensor::new(Array3::from_elem((3, 2, 2), 0.5));
        let out = ctx_run(&TensorNormalize { mean: 0.5, std: 0.5 }, Sample::Tensor(t), 0)
            .into_tensor("t")
            .unwrap();
        assert!(out.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_shift_warp_is_identity() {
        let plane = Array2::from_shape_fn((4, 30), |(y, x)| (y * 30 + x) as f32);
        let out = time_warp(&plane, 12, 0);
        for (a, b) in plane.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn warp_moves_center_column() {
        let plane = Array2::from_shape_fn((1, 21), |(_, x)| x as f32);
        let out = time_warp(&plane, 10, 4);
        assert!((out[[0, 14]] - 10.0).abs() < 1e-4);
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[0, 20]], 20.0);
    }

    #[test]
    fn masks_fill_whole_bands() {
        let mut plane = Array2::<f32>::ones((10, 40));
        let mut rng = StdRng::seed_from_u64(9);
        random_masks(&mut plane, Axis(1), 40, 1, 0.0, &mut rng);
        // every masked column is masked on every row
        for col in plane.columns() {
            let zeros = col.iter().filter(|&&v| v == 0.0).count();
            assert!(zeros == 0 || zeros == 10);
        }
    }

    #[test]
    fn augment_keeps_shape_and_replicates_channel_zero() {
        let data = Array3::from_shape_fn((3, 16, 64), |(c, y, x)| (c + y + x) as f32);
        let out = ctx_run(&TensorAugment::default(), Sample::Tensor(Tensor::new(data)), 4)
            .into_tensor("t")
            .unwrap();
        assert_eq!(out.shape(), (3, 16, 64));
        assert_eq!(out.data.slice(s![0, .., ..]), out.data.slice(s![2, .., ..]));
    }

    #[test]
    fn noise_changes_values_reproducibly() {
        let t = Tensor::new(Array3::zeros((3, 4, 4)));
        let a = ctx_run(&TensorAddNoise { std: 1.0 }, Sample::Tensor(t.clone()), 2);
        let b = ctx_run(&TensorAddNoise { std: 1.0 }, Sample::Tensor(t), 2);
        let (a, b) = (a.into_tensor("t").unwrap(), b.into_tensor("t").unwrap());
        assert_eq!(a, b);
        assert!(a.data.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn standard_normal_has_unit_spread() {
        let mut rng = StdRng::seed_from_u64(11);
        let draws: Vec<f32> = (0..20_000).map(|_| standard_normal(&mut rng)).collect();
        let mean = draws.iter().sum::<f32>() / draws.len() as f32;
        let var = draws.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / draws.len() as f32;
        assert!(mean.abs() < 0.05, "{mean}");
        assert!((var - 1.0).abs() < 0.05, "{var}");
        assert!(draws.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn save_writes_png_named_after_stem() {
        let dir = tempfile::tempdir().unwrap();
        let action = SaveTensorToDisk { dir: dir.path().join("debug") };
        let t = Tensor::new(Array3::from_elem((3, 5, 7), 0.25));
        let out = ctx_run(&action, Sample::Tensor(t.clone()), 0);
        assert_eq!(out.into_tensor("t").unwrap(), t);

        let files: Vec<_> = fs::read_dir(dir.path().join("debug"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("clip_") && files[0].ends_with(".png"));
        let img = image::open(dir.path().join("debug").join(&files[0])).unwrap();
        assert_eq!(img.to_luma8().dimensions(), (7, 5));
    }
}
