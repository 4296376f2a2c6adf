use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// songscope: bird-sound feature engineering and CNN preprocessing.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Fichier de configuration TOML. Défaut : config/default.toml.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Niveau de log : error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Sous-commandes.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute Lasseck2013 file statistics for every training label.
    Stats(StatsArgs),
    /// Precompute the spectrogram store from audio.
    Cache(CacheArgs),
    /// Split long recordings into fixed-length clips.
    Split(SplitArgs),
    /// Run a preprocessing pipeline over a label table.
    Preprocess(PreprocessArgs),
}

/// Overrides shared by the statistics commands.
#[derive(Args, Debug, Default)]
pub struct CorpusArgs {
    /// Directory with the training CSV and audio.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Spectrogram store directory.
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Worker threads (0 = all cores).
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Compute spectrograms from audio instead of reading the store.
    #[arg(long, default_value_t = false)]
    pub compute: bool,

    /// Keep going when a label fails and report failures at the end.
    #[arg(long, default_value_t = false)]
    pub skip_failures: bool,

    /// Where per-label JSON results are written.
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Recompute labels already in the store.
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Directory scanned recursively for WAV files.
    pub input: PathBuf,

    /// Clip output directory.
    #[arg(short, long, default_value = "segments")]
    pub output: PathBuf,

    /// Clip length in seconds.
    #[arg(long, default_value_t = 5.0)]
    pub duration: f64,

    /// Overlap between clips in seconds.
    #[arg(long, default_value_t = 1.0)]
    pub overlap: f64,

    /// Keep only clips overlapping a Raven annotation.
    #[arg(long, default_value_t = false)]
    pub annotations: bool,

    /// CSV with raw,corrected class names.
    #[arg(long)]
    pub label_corrections: Option<PathBuf>,

    /// Add a final clip aligned on the end of each recording.
    #[arg(long, default_value_t = false)]
    pub include_last_segment: bool,

    /// Row file. Défaut : stdout.
    #[arg(long)]
    pub rows: Option<PathBuf>,
}

/// Pipeline layouts selectable from the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreprocessorChoice {
    AudioLoading,
    AudioToImage,
    ResnetMultilabel,
}

#[derive(Args, Debug)]
pub struct PreprocessArgs {
    /// Label table: file column then one-hot class columns.
    pub labels: PathBuf,

    /// Pipeline layout.
    #[arg(long, value_enum, default_value_t = PreprocessorChoice::ResnetMultilabel)]
    pub kind: PreprocessorChoice,

    /// Directory relative file names are resolved against.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Random clip length in seconds.
    #[arg(long)]
    pub audio_length: Option<f64>,

    /// Disable overlay, jitter, affine and tensor augmentation.
    #[arg(long, default_value_t = false)]
    pub no_augmentation: bool,

    /// Save the final tensor of every sample as a PNG here.
    #[arg(long)]
    pub debug: Option<PathBuf>,

    /// Separate overlay candidate table.
    #[arg(long)]
    pub overlay_labels: Option<PathBuf>,

    /// Seed for reproducible augmentation.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (0 = all cores).
    #[arg(long, default_value_t = 0)]
    pub workers: usize,
}
