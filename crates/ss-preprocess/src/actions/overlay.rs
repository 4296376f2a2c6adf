use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use image::GrayImage;
use rand::Rng;
use rand::seq::SliceRandom;
use ss_core::{LabelRow, LabelTable};

use crate::action::{Action, ActionContext};
use crate::actions::resolve_label;
use crate::error::PreprocessError;
use crate::pipeline::Pipeline;
use crate::resize::GrayResizer;
use crate::sample::Sample;

/// Which overlay candidates are eligible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OverlayClass {
    /// Rows sharing no class with the current sample.
    Different,
    /// Rows where this class is present.
    Named(String),
}

/// Blend weight given to the overlay image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OverlayWeight {
    /// Always this weight, in `(0, 1)`.
    Fixed(f32),
    /// Drawn uniformly per overlay from `[lo, hi]`.
    Random {
        /// Lower bound.
        lo: f32,
        /// Upper bound.
        hi: f32,
    },
}

/// Tunables of [`ImgOverlay`].
#[derive(Clone, Debug)]
pub struct OverlayOptions {
    /// Probability of each overlay attempt; the first miss stops the loop.
    pub prob: f64,
    /// Maximum number of overlays per sample.
    pub max_overlay: usize,
    /// Blend weight.
    pub weight: OverlayWeight,
    /// Candidate filter.
    pub class: OverlayClass,
    /// Union the overlay's labels into the sample's labels.
    pub update_labels: bool,
    /// Upper bound (exclusive, in tenths) of the blur applied to overlays.
    pub max_blur_tenths: u32,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            prob: 1.0,
            max_overlay: 1,
            weight: OverlayWeight::Random { lo: 0.2, hi: 0.5 },
            class: OverlayClass::Different,
            update_labels: true,
            max_blur_tenths: 8,
        }
    }
}

/// Mélange l'image courante avec des images d'autres fichiers.
///
/// Les candidats viennent d'une table en lecture seule partagée. Chaque
/// candidat est chargé avec son propre pipeline (chargement, découpe,
/// spectrogramme, image), flouté, puis mélangé :
/// `(1 - w) * original + w * overlay`.
pub struct ImgOverlay {
    table: Arc<LabelTable>,
    data_dir: Option<PathBuf>,
    loader: Pipeline,
    options: OverlayOptions,
    class_idx: Option<usize>,
}

impl ImgOverlay {
    /// Build an overlay action over `table`.
    ///
    /// # Errors
    /// Returns `PreprocessError::Config` if the probability or weight is out
    /// of range or a named class is not a column of `table`.
    pub fn new(
        table: Arc<LabelTable>,
        data_dir: Option<PathBuf>,
        loader: Pipeline,
        options: OverlayOptions,
    ) -> Result<Self, PreprocessError> {
        if !(0.0..=1.0).contains(&options.prob) {
            return Err(PreprocessError::Config(format!(
                "overlay probability {} not in [0, 1]",
                options.prob
            )));
        }
        let weight_ok = match options.weight {
            OverlayWeight::Fixed(w) => w > 0.0 && w < 1.0,
            OverlayWeight::Random { lo, hi } => 0.0 <= lo && lo <= hi && hi <= 1.0,
        };
        if !weight_ok {
            return Err(PreprocessError::Config(format!(
                "overlay weight {:?} out of range",
                options.weight
            )));
        }
        let class_idx = match &options.class {
            OverlayClass::Different => None,
            OverlayClass::Named(name) => Some(table.class_index(name).ok_or_else(|| {
                PreprocessError::Config(format!(
                    "overlay class '{name}' is not one of {:?}",
                    table.classes()
                ))
            })?),
        };
        Ok(Self {
            table,
            data_dir,
            loader,
            options,
            class_idx,
        })
    }

    fn candidates(&self, labels: &LabelRow) -> Vec<usize> {
        match self.class_idx {
            Some(idx) => self.table.positions_with_class(idx),
            None => (0..self.table.len())
                .filter(|&i| self.table.row(i).is_some_and(|row| !row.overlaps(labels)))
                .collect(),
        }
    }

    fn weight(&self, rng: &mut impl Rng) -> f32 {
        match self.options.weight {
            OverlayWeight::Fixed(w) => w,
            OverlayWeight::Random { lo, hi } if hi > lo => rng.gen_range(lo..=hi),
            OverlayWeight::Random { lo, .. } => lo,
        }
    }

    fn overlay_once(
        &self,
        base: &GrayImage,
        labels: LabelRow,
        ctx: &mut ActionContext<'_>,
    ) -> Result<(GrayImage, LabelRow)> {
        let candidates = self.candidates(&labels);
        let Some(&pick) = candidates.choose(ctx.rng) else {
            bail!("no overlay candidate matches {:?}", self.options.class);
        };
        let (Some(label), Some(row)) = (self.table.label(pick), self.table.row(pick)) else {
            bail!("overlay row {pick} missing from table");
        };
        let path = resolve_label(self.data_dir.as_deref(), label);
        let (sample, _) = self
            .loader
            .run(Sample::Path(path.clone()), row.clone(), &path, ctx.rng)
            .with_context(|| format!("loading overlay {}", path.display()))?;
        let mut overlay = sample.into_image("overlay")?;

        if overlay.dimensions() != base.dimensions() {
            overlay = GrayResizer::new().resize(&overlay, base.width(), base.height())?;
        }
        if self.options.max_blur_tenths > 0 {
            let sigma = ctx.rng.gen_range(0..self.options.max_blur_tenths) as f32 / 10.0;
            if sigma > 0.0 {
                overlay = image::imageops::blur(&overlay, sigma);
            }
        }

        let w = self.weight(ctx.rng);
        let blended = blend(base, &overlay, w);
        log::debug!("overlaid {} with weight {w:.2}", path.display());

        let labels = if self.options.update_labels {
            labels.union(row)
        } else {
            labels
        };
        Ok((blended, labels))
    }
}

/// `(1 - weight) * a + weight * b`, pixel by pixel. Images must share
/// dimensions.
#[must_use]
pub fn blend(a: &GrayImage, b: &GrayImage, weight: f32) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let pa = f32::from(a.get_pixel(x, y).0[0]);
        let pb = f32::from(b.get_pixel(x, y).0[0]);
        image::Luma([((1.0 - weight) * pa + weight * pb).round().clamp(0.0, 255.0) as u8])
    })
}

impl Action for ImgOverlay {
    fn name(&self) -> &'static str {
        "overlay"
    }

    fn needs_labels(&self) -> bool {
        true
    }

    fn apply(&self, sample: Sample, ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let empty = LabelRow::new(vec![0.0; self.table.classes().len()]);
        self.apply_with_labels(sample, empty, ctx).map(|(s, _)| s)
    }

    fn apply_with_labels(
        &self,
        sample: Sample,
        mut labels: LabelRow,
        ctx: &mut ActionContext<'_>,
    ) -> Result<(Sample, LabelRow)> {
        let mut img = sample.into_image(self.name())?;
        for _ in 0..self.options.max_overlay {
            if !ctx.rng.gen_bool(self.options.prob) {
                break;
            }
            (img, labels) = self.overlay_once(&img, labels, ctx)?;
        }
        Ok((Sample::Image(img), labels))
    }
}
