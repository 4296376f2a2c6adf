use std::path::PathBuf;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use ss_core::{LabelRow, LabelTable, PreprocessConfig};

use crate::actions::{
    AudioLoader, AudioToSpectrogram, AudioTrimmer, ColorJitter, ImgOverlay, ImgToTensor,
    OverlayClass, OverlayOptions, OverlayWeight, RandomAffine, SaveTensorToDisk, SpecToImg,
    TensorAddNoise, TensorAugment, TensorNormalize, resolve_label,
};
use crate::error::PreprocessError;
use crate::pipeline::Pipeline;
use crate::sample::Sample;

/// Pipeline layout built by a [`Preprocessor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreprocessorKind {
    /// Load audio only.
    AudioLoading,
    /// Single guaranteed overlay, tensor augmentation after normalization.
    AudioToImage,
    /// Up to two overlays, noise before normalization.
    ResnetMultilabel,
}

/// Construction options shared by every [`PreprocessorKind`].
#[derive(Clone, Debug)]
pub struct PreprocessOptions {
    /// Random trim length in seconds, `None` keeps whole clips.
    pub audio_length: Option<f64>,
    /// Enable overlay, jitter, affine and tensor augmentation.
    pub augmentation: bool,
    /// Write the final tensor of every sample as a PNG here.
    pub debug: Option<PathBuf>,
    /// Overlay candidates; the sample table is used when absent.
    pub overlay_table: Option<Arc<LabelTable>>,
    /// Return the label row with each sample.
    pub return_labels: bool,
    /// Image, STFT and normalization parameters.
    pub config: PreprocessConfig,
    /// Seed for reproducible augmentation; entropy when absent.
    pub seed: Option<u64>,
    /// Directory relative labels are resolved against.
    pub data_dir: Option<PathBuf>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            audio_length: None,
            augmentation: true,
            debug: None,
            overlay_table: None,
            return_labels: true,
            config: PreprocessConfig::default(),
            seed: None,
            data_dir: None,
        }
    }
}

/// One materialized sample.
#[derive(Clone, Debug)]
pub struct Item {
    /// Pipeline output: audio for [`PreprocessorKind::AudioLoading`], a
    /// tensor otherwise.
    pub sample: Sample,
    /// Final label row, when labels are returned.
    pub labels: Option<LabelRow>,
}

/// Dataset over a label table that runs a fixed action pipeline per index.
///
/// Holds only read-only state: `get` may be called from several threads at
/// once.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use ss_core::LabelTable;
/// use ss_preprocess::{PreprocessOptions, Preprocessor};
///
/// let table = LabelTable::parse_csv("file,a\nx.wav,1\n", "inline").unwrap();
/// let pre = Preprocessor::audio_loading(Arc::new(table), PreprocessOptions::default()).unwrap();
/// assert_eq!(pre.len(), 1);
/// assert_eq!(pre.pipeline().names(), vec!["load_audio"]);
/// ```
pub struct Preprocessor {
    kind: PreprocessorKind,
    table: Arc<LabelTable>,
    options: PreprocessOptions,
    pipeline: Pipeline,
}

impl Preprocessor {
    /// Build a preprocessor of the given kind.
    ///
    /// # Errors
    /// Returns `PreprocessError::Config` for invalid sizes, a non-positive
    /// clip length or std, or invalid overlay settings.
    pub fn new(
        kind: PreprocessorKind,
        table: Arc<LabelTable>,
        options: PreprocessOptions,
    ) -> Result<Self, PreprocessError> {
        let pipeline = build_pipeline(kind, &table, &options)?;
        Ok(Self {
            kind,
            table,
            options,
            pipeline,
        })
    }

    /// Audio loading only.
    ///
    /// # Errors
    /// See [`Preprocessor::new`].
    pub fn audio_loading(
        table: Arc<LabelTable>,
        options: PreprocessOptions,
    ) -> Result<Self, PreprocessError> {
        Self::new(PreprocessorKind::AudioLoading, table, options)
    }

    /// Audio to normalized image tensor.
    ///
    /// # Errors
    /// See [`Preprocessor::new`].
    pub fn audio_to_image(
        table: Arc<LabelTable>,
        options: PreprocessOptions,
    ) -> Result<Self, PreprocessError> {
        Self::new(PreprocessorKind::AudioToImage, table, options)
    }

    /// Audio to normalized image tensor with the multi-label augmentation
    /// chain.
    ///
    /// # Errors
    /// See [`Preprocessor::new`].
    pub fn resnet_multilabel(
        table: Arc<LabelTable>,
        options: PreprocessOptions,
    ) -> Result<Self, PreprocessError> {
        Self::new(PreprocessorKind::ResnetMultilabel, table, options)
    }

    /// Layout of this preprocessor.
    #[must_use]
    pub fn kind(&self) -> PreprocessorKind {
        self.kind
    }

    /// The action pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The sample table.
    #[must_use]
    pub fn table(&self) -> &LabelTable {
        &self.table
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Switch augmentation on or off and rebuild the pipeline.
    ///
    /// # Errors
    /// See [`Preprocessor::new`].
    pub fn set_augmentation(&mut self, on: bool) -> Result<(), PreprocessError> {
        let mut options = self.options.clone();
        options.augmentation = on;
        self.pipeline = build_pipeline(self.kind, &self.table, &options)?;
        self.options = options;
        Ok(())
    }

    /// Per-class sums of the label table.
    #[must_use]
    pub fn class_counts(&self) -> Vec<(String, f32)> {
        self.table.class_counts()
    }

    /// Run the pipeline on sample `idx`.
    ///
    /// With a seed, sample `idx` always draws the same random numbers.
    ///
    /// # Errors
    /// Returns `PreprocessError::Index` past the end of the table and
    /// `PreprocessError::Action` when an action fails.
    pub fn get(&self, idx: usize) -> Result<Item, PreprocessError> {
        let (Some(label), Some(row)) = (self.table.label(idx), self.table.row(idx)) else {
            return Err(PreprocessError::Index {
                index: idx,
                len: self.table.len(),
            });
        };
        let path = resolve_label(self.options.data_dir.as_deref(), label);
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ (idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_entropy(),
        };
        let (sample, labels) =
            self.pipeline
                .run(Sample::Path(path.clone()), row.clone(), &path, &mut rng)?;
        Ok(Item {
            sample,
            labels: self.options.return_labels.then_some(labels),
        })
    }
}

fn validate(options: &PreprocessOptions) -> Result<(), PreprocessError> {
    let c = &options.config;
    if c.width == 0 || c.height == 0 {
        return Err(PreprocessError::Config(format!(
            "image size {}x{} must be non-zero",
            c.width, c.height
        )));
    }
    if c.fft_size == 0 || c.hop_length == 0 {
        return Err(PreprocessError::Config(
            "fft_size and hop_length must be non-zero".into(),
        ));
    }
    if c.std <= 0.0 {
        return Err(PreprocessError::Config(format!("std {} must be positive", c.std)));
    }
    if let Some(len) = options.audio_length.filter(|&l| l <= 0.0) {
        return Err(PreprocessError::Config(format!(
            "audio_length {len} must be positive"
        )));
    }
    Ok(())
}

/// Load, trim, spectrogram, image: the front of every image pipeline and the
/// overlay loader.
fn loader_pipeline(options: &PreprocessOptions) -> Pipeline {
    let c = &options.config;
    Pipeline::new()
        .with(AudioLoader { sample_rate: Some(c.sample_rate) })
        .with(AudioTrimmer {
            audio_length: options.audio_length,
            extend_short_clips: c.extend_short_clips,
        })
        .with(AudioToSpectrogram { fft_size: c.fft_size, hop_length: c.hop_length })
        .with(SpecToImg::new(c.width, c.height))
}

fn build_pipeline(
    kind: PreprocessorKind,
    table: &Arc<LabelTable>,
    options: &PreprocessOptions,
) -> Result<Pipeline, PreprocessError> {
    validate(options)?;
    let c = &options.config;

    if kind == PreprocessorKind::AudioLoading {
        return Ok(Pipeline::new().with(AudioLoader { sample_rate: Some(c.sample_rate) }));
    }

    let mut pipeline = loader_pipeline(options);
    let normalize = TensorNormalize { mean: c.mean, std: c.std };

    if options.augmentation {
        let overlay_options = match kind {
            PreprocessorKind::ResnetMultilabel => OverlayOptions {
                prob: 0.5,
                max_overlay: 2,
                weight: OverlayWeight::Random { lo: 0.2, hi: 0.5 },
                ..OverlayOptions::default()
            },
            _ => OverlayOptions {
                prob: 1.0,
                max_overlay: 1,
                class: OverlayClass::Different,
                ..OverlayOptions::default()
            },
        };
        let candidates = options
            .overlay_table
            .clone()
            .unwrap_or_else(|| Arc::clone(table));
        pipeline.push(ImgOverlay::new(
            candidates,
            options.data_dir.clone(),
            loader_pipeline(options),
            overlay_options,
        )?);
        pipeline.push(ColorJitter::default());
        pipeline.push(RandomAffine::default());
    }

    pipeline.push(ImgToTensor);
    match (kind, options.augmentation) {
        (PreprocessorKind::ResnetMultilabel, true) => {
            pipeline.push(TensorAugment::default());
            pipeline.push(TensorAddNoise { std: 1.0 });
            pipeline.push(normalize);
        }
        (_, true) => {
            pipeline.push(normalize);
            pipeline.push(TensorAugment::default());
        }
        (_, false) => pipeline.push(normalize),
    }

    if let Some(dir) = &options.debug {
        pipeline.push(SaveTensorToDisk { dir: dir.clone() });
    }
    log::debug!("{kind:?} pipeline: {:?}", pipeline.names());
    Ok(pipeline)
}
