use thiserror::Error;

/// Errors originating from the audio module.
#[derive(Error, Debug)]
pub enum AudioError {
    /// Decoded file contained no samples.
    #[error("no samples decoded from {path}")]
    Empty {
        /// Source file.
        path: String,
    },

    /// Clip is shorter than the requested duration.
    #[error("clip is {actual:.3}s long, {requested:.3}s requested")]
    TooShort {
        /// Available duration in seconds.
        actual: f64,
        /// Requested duration in seconds.
        requested: f64,
    },

    /// Invalid trim window.
    #[error("invalid trim window {start:.3}s..{end:.3}s")]
    InvalidWindow {
        /// Window start in seconds.
        start: f64,
        /// Window end in seconds.
        end: f64,
    },

    /// Resampler construction or processing failed.
    #[error("resampling error: {0}")]
    Resample(String),

    /// Clip duration must exceed the overlap between clips.
    #[error("clip duration {duration}s must exceed overlap {overlap}s")]
    InvalidSplit {
        /// Clip length in seconds.
        duration: f64,
        /// Overlap in seconds.
        overlap: f64,
    },

    /// Malformed annotation or label-correction table.
    #[error("{path}: {reason}")]
    Annotation {
        /// Offending table.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// WAV writer error.
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}
