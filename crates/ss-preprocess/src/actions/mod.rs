//! Actions concrètes du pipeline de prétraitement.
//!
//! Chaîne typique : chemin → audio → spectrogramme (dB) → image → tenseur.

pub mod audio;
pub mod image;
pub mod overlay;
pub mod spectrogram;
pub mod tensor;

use std::path::{Path, PathBuf};

pub use audio::{AudioLoader, AudioTrimmer, random_audio_trim};
pub use image::{ColorJitter, RandomAffine};
pub use overlay::{ImgOverlay, OverlayClass, OverlayOptions, OverlayWeight};
pub use spectrogram::{AudioToSpectrogram, DECIBEL_LIMITS, SpecToImg};
pub use tensor::{ImgToTensor, SaveTensorToDisk, TensorAddNoise, TensorAugment, TensorNormalize};

/// Resolve a table label to a file path: relative labels are joined onto
/// `data_dir` when one is given.
#[must_use]
pub fn resolve_label(data_dir: Option<&Path>, label: &str) -> PathBuf {
    let path = Path::new(label);
    match data_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
