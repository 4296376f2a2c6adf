use thiserror::Error;

/// Errors originating from the core module.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid configuration value or structure.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Bounding box with inverted coordinates.
    #[error("invalid bounding box: x {x_min}..{x_max}, y {y_min}..{y_max}")]
    InvalidBox {
        /// Time bin start.
        x_min: usize,
        /// Time bin end.
        x_max: usize,
        /// Frequency bin start.
        y_min: usize,
        /// Frequency bin end.
        y_max: usize,
    },

    /// Normalization factor must be strictly positive and finite.
    #[error("invalid normalization factor: {0}")]
    InvalidNormalization(f32),

    /// Spectrogram magnitudes must be non-negative.
    #[error("spectrogram contains negative or non-finite magnitudes")]
    NegativeMagnitude,

    /// More frequency bands requested than the spectrogram has rows.
    #[error("cannot split {height} frequency rows into {bands} bands")]
    BandCountExceedsHeight {
        /// Requested band count.
        bands: usize,
        /// Spectrogram height (frequency bins).
        height: usize,
    },

    /// Malformed label table.
    #[error("label table {path}, line {line}: {reason}")]
    LabelTable {
        /// Source path of the table.
        path: String,
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },
}
