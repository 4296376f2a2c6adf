use std::path::PathBuf;

use image::GrayImage;
use ndarray::{Array2, Array3};
use ss_audio::Audio;

use crate::error::PreprocessError;

/// Spectrogramme en décibels (lignes = fréquences, ligne 0 = DC).
#[derive(Clone, Debug, PartialEq)]
pub struct DecibelSpectrogram {
    /// dB values.
    pub values: Array2<f32>,
}

/// Image tensor laid out as `(channels, height, width)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Pixel values.
    pub data: Array3<f32>,
}

impl Tensor {
    /// Wrap a `(channels, height, width)` array.
    #[must_use]
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    /// `(channels, height, width)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }
}

/// Valeur transportée d'une action à la suivante.
///
/// Chaque action consomme une variante et en produit une autre (ou la même).
#[derive(Clone, Debug)]
pub enum Sample {
    /// Audio file to load.
    Path(PathBuf),
    /// Decoded mono clip.
    Audio(Audio),
    /// dB spectrogram.
    Spectrogram(DecibelSpectrogram),
    /// 8-bit grayscale image.
    Image(GrayImage),
    /// Float tensor.
    Tensor(Tensor),
}

impl Sample {
    /// Kind name used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Path(_) => "path",
            Self::Audio(_) => "audio",
            Self::Spectrogram(_) => "spectrogram",
            Self::Image(_) => "image",
            Self::Tensor(_) => "tensor",
        }
    }

    fn mismatch(&self, action: &'static str, expected: &'static str) -> PreprocessError {
        PreprocessError::UnexpectedSample {
            action,
            expected,
            found: self.kind(),
        }
    }

    /// Take the path or report a mismatch for `action`.
    ///
    /// # Errors
    /// Returns `PreprocessError::UnexpectedSample` for any other kind.
    pub fn into_path(self, action: &'static str) -> Result<PathBuf, PreprocessError> {
        match self {
            Self::Path(p) => Ok(p),
            other => Err(other.mismatch(action, "path")),
        }
    }

    /// Take the audio clip or report a mismatch for `action`.
    ///
    /// # Errors
    /// Returns `PreprocessError::UnexpectedSample` for any other kind.
    pub fn into_audio(self, action: &'static str) -> Result<Audio, PreprocessError> {
        match self {
            Self::Audio(a) => Ok(a),
            other => Err(other.mismatch(action, "audio")),
        }
    }

    /// Take the spectrogram or report a mismatch for `action`.
    ///
    /// # Errors
    /// Returns `PreprocessError::UnexpectedSample` for any other kind.
    pub fn into_spectrogram(
        self,
        action: &'static str,
    ) -> Result<DecibelSpectrogram, PreprocessError> {
        match self {
            Self::Spectrogram(s) => Ok(s),
            other => Err(other.mismatch(action, "spectrogram")),
        }
    }

    /// Take the image or report a mismatch for `action`.
    ///
    /// # Errors
    /// Returns `PreprocessError::UnexpectedSample` for any other kind.
    pub fn into_image(self, action: &'static str) -> Result<GrayImage, PreprocessError> {
        match self {
            Self::Image(i) => Ok(i),
            other => Err(other.mismatch(action, "image")),
        }
    }

    /// Take the tensor or report a mismatch for `action`.
    ///
    /// # Errors
    /// Returns `PreprocessError::UnexpectedSample` for any other kind.
    pub fn into_tensor(self, action: &'static str) -> Result<Tensor, PreprocessError> {
        match self {
            Self::Tensor(t) => Ok(t),
            other => Err(other.mismatch(action, "tensor")),
        }
    }
}
