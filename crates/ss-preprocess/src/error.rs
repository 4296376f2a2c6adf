use std::path::PathBuf;

use thiserror::Error;

/// Errors originating from the preprocessing pipeline.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// An action failed on one sample.
    #[error("action '{action}' failed on {}: {reason}", path.display())]
    Action {
        /// Sample being processed.
        path: PathBuf,
        /// Name of the failing action.
        action: &'static str,
        /// Rendered error chain.
        reason: String,
    },

    /// An action received a sample of the wrong kind.
    #[error("action '{action}' expects {expected}, got {found}")]
    UnexpectedSample {
        /// Name of the action.
        action: &'static str,
        /// Expected sample kind.
        expected: &'static str,
        /// Received sample kind.
        found: &'static str,
    },

    /// Index past the end of the dataset.
    #[error("index {index} out of range for {len} samples")]
    Index {
        /// Requested index.
        index: usize,
        /// Dataset size.
        len: usize,
    },

    /// Invalid preprocessor construction.
    #[error("invalid preprocessor configuration: {0}")]
    Config(String),
}
