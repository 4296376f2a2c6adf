//! Pipeline de prétraitement pour classifieurs convolutifs : audio brut →
//! spectrogramme → image augmentée → tenseur normalisé.

pub mod action;
pub mod actions;
pub mod error;
pub mod pipeline;
pub mod preprocessor;
pub mod resize;
pub mod sample;

pub use action::{Action, ActionContext};
pub use error::PreprocessError;
pub use pipeline::Pipeline;
pub use preprocessor::{Item, PreprocessOptions, Preprocessor, PreprocessorKind};
pub use sample::{DecibelSpectrogram, Sample, Tensor};
