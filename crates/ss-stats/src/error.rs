use ss_core::CoreError;
use thiserror::Error;

/// Errors originating from the statistics engine.
#[derive(Error, Debug)]
pub enum StatsError {
    /// Invalid input geometry or configuration.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// One label's task failed; the run was aborted.
    #[error("stats task for '{label}' failed: {reason}")]
    Task {
        /// Offending label.
        label: String,
        /// Rendered error chain.
        reason: String,
    },

    /// A label requested from a store is absent.
    #[error("no stored spectrogram for '{label}'")]
    Missing {
        /// Requested label.
        label: String,
    },

    /// A store entry was found for `requested` but holds another label.
    #[error("store entry for '{requested}' holds '{stored}'")]
    LabelMismatch {
        /// Label asked for.
        requested: String,
        /// Label recorded in the entry.
        stored: String,
    },

    /// Worker pool could not be built.
    #[error("worker pool: {0}")]
    Pool(String),
}
