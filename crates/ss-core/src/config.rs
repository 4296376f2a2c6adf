use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Configuration complète d'une exécution.
///
/// Sérialisable en TOML. Chaque champ a une valeur par défaut saine.
///
/// # Example
/// ```
/// use ss_core::config::AppConfig;
/// let config = AppConfig::default();
/// assert_eq!(config.stats.num_frequency_bands, 16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Lasseck2013 statistics run.
    pub stats: StatsConfig,
    /// CNN preprocessing pipeline.
    pub preprocess: PreprocessConfig,
}

/// What the statistics driver does when one label fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum FailurePolicy {
    /// Stop the run and report the first failing label.
    #[default]
    Abort,
    /// Log the failure, keep going, report failed labels at the end.
    Skip,
}

/// Paramètres de génération des spectrogrammes (mode calcul).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SpectrogramParams {
    /// Audio is resampled to this rate before the STFT.
    pub sample_rate: u32,
    /// STFT window length.
    pub fft_size: usize,
    /// STFT hop between frames.
    pub hop_length: usize,
    /// Normalized magnitude above which a bin belongs to a segment (0, 1].
    pub segment_threshold: f32,
    /// Connected components smaller than this many bins are dropped.
    pub min_segment_area: usize,
}

impl Default for SpectrogramParams {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            fft_size: 512,
            hop_length: 256,
            segment_threshold: 0.5,
            min_segment_area: 4,
        }
    }
}

/// Configuration du moteur de statistiques Lasseck2013.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StatsConfig {
    // === Données ===
    /// Directory holding the training CSV and audio files.
    pub data_dir: PathBuf,
    /// Training label table, relative to `data_dir`.
    pub train_file: String,
    /// Spectrogram cache read in `db_rw` mode.
    pub store_dir: PathBuf,
    /// Per-label result documents.
    pub results_dir: PathBuf,
    /// true = read spectrograms from `store_dir`, false = compute from audio.
    pub db_rw: bool,

    // === Statistiques ===
    /// Number of contiguous frequency bands (>= 1).
    pub num_frequency_bands: usize,
    /// Frequency tolerance around a template, in bins.
    pub template_match_frequency_buffer: usize,
    /// Also match a file's segments against its own spectrogram.
    pub match_self: bool,

    // === Exécution ===
    /// Worker threads. 0 = available parallelism.
    pub num_workers: usize,
    /// Behaviour on a failing label.
    pub failure_policy: FailurePolicy,
    /// Log progress every N completed labels.
    pub progress_every: usize,

    /// Compute-mode spectrogram parameters.
    pub spectrogram: SpectrogramParams,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            train_file: "train.csv".into(),
            store_dir: PathBuf::from("store/spectrograms"),
            results_dir: PathBuf::from("store/file_stats"),
            db_rw: true,
            num_frequency_bands: 16,
            template_match_frequency_buffer: 5,
            match_self: false,
            num_workers: 0,
            failure_policy: FailurePolicy::Abort,
            progress_every: 10,
            spectrogram: SpectrogramParams::default(),
        }
    }
}

impl StatsConfig {
    /// Full path of the training label table.
    #[must_use]
    pub fn train_path(&self) -> PathBuf {
        self.data_dir.join(&self.train_file)
    }

    /// Worker count after resolving `0` to the machine's parallelism.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        if self.num_workers > 0 {
            return self.num_workers;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}

/// Configuration du pipeline de prétraitement CNN.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PreprocessConfig {
    /// Output image width in pixels.
    pub width: u32,
    /// Output image height in pixels.
    pub height: u32,
    /// Target sample rate for loaded audio.
    pub sample_rate: u32,
    /// STFT window length.
    pub fft_size: usize,
    /// STFT hop between frames.
    pub hop_length: usize,
    /// Per-channel normalization mean.
    pub mean: f32,
    /// Per-channel normalization standard deviation (> 0).
    pub std: f32,
    /// Loop clips shorter than the requested duration instead of failing.
    pub extend_short_clips: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            sample_rate: 22050,
            fft_size: 512,
            hop_length: 256,
            mean: 0.5,
            std: 0.5,
            extend_short_clips: false,
        }
    }
}

impl AppConfig {
    /// Reject values the pipelines cannot run with.
    ///
    /// Called before any I/O so configuration mistakes fail fast.
    ///
    /// # Errors
    /// Returns `CoreError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.stats.validate()?;
        self.preprocess.validate()
    }
}

impl StatsConfig {
    /// Validation de la section `[stats]` seule.
    ///
    /// # Errors
    /// Returns `CoreError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.num_frequency_bands == 0 {
            return Err(CoreError::Config(
                "stats.num_frequency_bands must be >= 1".into(),
            ));
        }
        let sp = &self.spectrogram;
        if sp.fft_size < 2 || sp.hop_length == 0 || sp.sample_rate == 0 {
            return Err(CoreError::Config(format!(
                "stats.spectrogram: fft_size={} hop_length={} sample_rate={} are not usable",
                sp.fft_size, sp.hop_length, sp.sample_rate
            )));
        }
        if !(sp.segment_threshold > 0.0 && sp.segment_threshold <= 1.0) {
            return Err(CoreError::Config(format!(
                "stats.spectrogram.segment_threshold must be in (0, 1], got {}",
                sp.segment_threshold
            )));
        }
        Ok(())
    }
}

impl PreprocessConfig {
    /// Validation de la section `[preprocess]` seule.
    ///
    /// # Errors
    /// Returns `CoreError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.width == 0 || self.height == 0 {
            return Err(CoreError::Config(format!(
                "preprocess: invalid image size {}x{}",
                self.width, self.height
            )));
        }
        if self.fft_size < 2 || self.hop_length == 0 || self.sample_rate == 0 {
            return Err(CoreError::Config(
                "preprocess: fft_size, hop_length and sample_rate must be positive".into(),
            ));
        }
        if self.std.is_nan() || self.std <= 0.0 {
            return Err(CoreError::Config(format!(
                "preprocess.std must be > 0, got {}",
                self.std
            )));
        }
        Ok(())
    }
}

/// Structure TOML intermédiaire pour désérialisation avec valeurs optionnelles.
#[derive(Deserialize)]
struct ConfigFile {
    stats: Option<StatsSection>,
    preprocess: Option<PreprocessSection>,
}

/// Stats section of the TOML config, all fields optional for partial override.
#[derive(Deserialize)]
struct StatsSection {
    data_dir: Option<PathBuf>,
    train_file: Option<String>,
    store_dir: Option<PathBuf>,
    results_dir: Option<PathBuf>,
    db_rw: Option<bool>,
    num_frequency_bands: Option<usize>,
    template_match_frequency_buffer: Option<usize>,
    match_self: Option<bool>,
    num_workers: Option<usize>,
    failure_policy: Option<FailurePolicy>,
    progress_every: Option<usize>,
    sample_rate: Option<u32>,
    fft_size: Option<usize>,
    hop_length: Option<usize>,
    segment_threshold: Option<f32>,
    min_segment_area: Option<usize>,
}

/// Preprocess section of the TOML config, all fields optional.
#[derive(Deserialize)]
struct PreprocessSection {
    width: Option<u32>,
    height: Option<u32>,
    sample_rate: Option<u32>,
    fft_size: Option<usize>,
    hop_length: Option<usize>,
    mean: Option<f32>,
    std: Option<f32>,
    extend_short_clips: Option<bool>,
}

/// Charge un fichier TOML, fusionne avec les valeurs par défaut et valide.
///
/// # Errors
/// Returns an error if the file cannot be read, parsed, or fails validation.
///
/// # Example
/// ```no_run
/// use ss_core::config::load_config;
/// use std::path::Path;
/// let config = load_config(Path::new("config/default.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let config = parse_config(&content)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Parse TOML content over the defaults and validate the result.
///
/// # Errors
/// Returns an error on malformed TOML or invalid values.
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let file: ConfigFile = toml::from_str(content).context("TOML parse error")?;
    let mut config = AppConfig::default();

    if let Some(s) = file.stats {
        let c = &mut config.stats;
        if let Some(v) = s.data_dir {
            c.data_dir = v;
        }
        if let Some(v) = s.train_file {
            c.train_file = v;
        }
        if let Some(v) = s.store_dir {
            c.store_dir = v;
        }
        if let Some(v) = s.results_dir {
            c.results_dir = v;
        }
        if let Some(v) = s.db_rw {
            c.db_rw = v;
        }
        if let Some(v) = s.num_frequency_bands {
            c.num_frequency_bands = v;
        }
        if let Some(v) = s.template_match_frequency_buffer {
            c.template_match_frequency_buffer = v;
        }
        if let Some(v) = s.match_self {
            c.match_self = v;
        }
        if let Some(v) = s.num_workers {
            c.num_workers = v;
        }
        if let Some(v) = s.failure_policy {
            c.failure_policy = v;
        }
        if let Some(v) = s.progress_every {
            c.progress_every = v.max(1);
        }
        if let Some(v) = s.sample_rate {
            c.spectrogram.sample_rate = v;
        }
        if let Some(v) = s.fft_size {
            c.spectrogram.fft_size = v;
        }
        if let Some(v) = s.hop_length {
            c.spectrogram.hop_length = v;
        }
        if let Some(v) = s.segment_threshold {
            c.spectrogram.segment_threshold = v;
        }
        if let Some(v) = s.min_segment_area {
            c.spectrogram.min_segment_area = v;
        }
    }

    if let Some(p) = file.preprocess {
        let c = &mut config.preprocess;
        if let Some(v) = p.width {
            c.width = v;
        }
        if let Some(v) = p.height {
            c.height = v;
        }
        if let Some(v) = p.sample_rate {
            c.sample_rate = v;
        }
        if let Some(v) = p.fft_size {
            c.fft_size = v;
        }
        if let Some(v) = p.hop_length {
            c.hop_length = v;
        }
        if let Some(v) = p.mean {
            c.mean = v;
        }
        if let Some(v) = p.std {
            c.std = v;
        }
        if let Some(v) = p.extend_short_clips {
            c.extend_short_clips = v;
        }
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            "[stats]\nnum_frequency_bands = 4\nfailure_policy = \"Skip\"\n",
        )
        .unwrap();
        assert_eq!(config.stats.num_frequency_bands, 4);
        assert_eq!(config.stats.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.stats.template_match_frequency_buffer, 5);
        assert_eq!(config.preprocess.width, 224);
    }

    #[test]
    fn zero_bands_fail_validation() {
        let err = parse_config("[stats]\nnum_frequency_bands = 0\n").unwrap_err();
        let root = err.downcast_ref::<CoreError>();
        assert!(matches!(root, Some(CoreError::Config(_))), "{err:#}");
    }

    #[test]
    fn stats_section_validates_on_its_own() {
        let mut stats = StatsConfig::default();
        assert!(stats.validate().is_ok());
        stats.num_frequency_bands = 0;
        assert!(matches!(stats.validate(), Err(CoreError::Config(_))));
        let app = AppConfig {
            stats,
            ..AppConfig::default()
        };
        assert!(app.validate().is_err());
    }

    #[test]
    fn empty_file_is_default() {
        let config = parse_config("").unwrap();
        assert!(config.stats.db_rw);
        assert_eq!(config.stats.train_path(), PathBuf::from("data/train.csv"));
    }

    #[test]
    fn resolved_workers_is_positive() {
        let mut stats = StatsConfig::default();
        assert!(stats.resolved_workers() >= 1);
        stats.num_workers = 3;
        assert_eq!(stats.resolved_workers(), 3);
    }

    #[test]
    fn bad_threshold_rejected() {
        assert!(parse_config("[stats]\nsegment_threshold = 0.0\n").is_err());
        assert!(parse_config("[preprocess]\nstd = 0.0\n").is_err());
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[preprocess]\nwidth = 128\n").unwrap();
        assert_eq!(load_config(&path).unwrap().preprocess.width, 128);
    }

    #[test]
    fn shipped_default_matches_defaults() {
        let config = parse_config(include_str!("../../../config/default.toml")).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(config.stats.num_frequency_bands, defaults.stats.num_frequency_bands);
        assert_eq!(config.stats.store_dir, defaults.stats.store_dir);
        assert_eq!(config.preprocess.height, defaults.preprocess.height);
    }
}
