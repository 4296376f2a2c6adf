use ndarray::{Array2, ArrayView2, s};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Événement acoustique détecté dans un spectrogramme.
///
/// Coordonnées en bins, intervalles semi-ouverts : le segment couvre les
/// lignes `y_min..y_max` et les colonnes `x_min..x_max`.
///
/// # Example
/// ```
/// use ss_core::spectrogram::BoundingBox;
/// let b = BoundingBox::new(2, 10, 4, 7).unwrap();
/// assert_eq!(b.width(), 8);
/// assert_eq!(b.height(), 3);
/// assert!(BoundingBox::new(5, 1, 0, 0).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBox")]
pub struct BoundingBox {
    /// First time bin.
    pub x_min: usize,
    /// One past the last time bin.
    pub x_max: usize,
    /// First frequency bin.
    pub y_min: usize,
    /// One past the last frequency bin.
    pub y_max: usize,
}

impl BoundingBox {
    /// Build a box, rejecting inverted coordinates.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidBox` if `x_min > x_max` or `y_min > y_max`.
    pub fn new(x_min: usize, x_max: usize, y_min: usize, y_max: usize) -> Result<Self, CoreError> {
        if x_min > x_max || y_min > y_max {
            return Err(CoreError::InvalidBox {
                x_min,
                x_max,
                y_min,
                y_max,
            });
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    /// Time extent in bins.
    #[must_use]
    pub fn width(&self) -> usize {
        self.x_max - self.x_min
    }

    /// Frequency extent in bins.
    #[must_use]
    pub fn height(&self) -> usize {
        self.y_max - self.y_min
    }
}

/// Forme sérialisée, validée par `BoundingBox::new` à la lecture.
#[derive(Deserialize)]
struct RawBox {
    x_min: usize,
    x_max: usize,
    y_min: usize,
    y_max: usize,
}

impl TryFrom<RawBox> for BoundingBox {
    type Error = CoreError;

    fn try_from(raw: RawBox) -> Result<Self, CoreError> {
        Self::new(raw.x_min, raw.x_max, raw.y_min, raw.y_max)
    }
}

/// Table des boîtes d'un fichier, dans l'ordre de détection.
pub type BoxTable = Vec<BoundingBox>;

/// Spectrogramme normalisé et son facteur de normalisation.
///
/// Les deux valeurs voyagent ensemble : `raw = data * normalization`.
/// Lignes = bins de fréquence, colonnes = bins temporels.
///
/// # Example
/// ```
/// use ndarray::array;
/// use ss_core::spectrogram::Spectrogram;
/// let spec = Spectrogram::new(array![[0.5, 1.0], [0.0, 0.25]], 4.0).unwrap();
/// assert_eq!(spec.height(), 2);
/// assert_eq!(spec.raw()[[0, 1]], 4.0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSpectrogram")]
pub struct Spectrogram {
    data: Array2<f32>,
    normalization: f32,
}

#[derive(Deserialize)]
struct RawSpectrogram {
    data: Array2<f32>,
    normalization: f32,
}

impl TryFrom<RawSpectrogram> for Spectrogram {
    type Error = CoreError;

    fn try_from(raw: RawSpectrogram) -> Result<Self, CoreError> {
        Self::new(raw.data, raw.normalization)
    }
}

impl Spectrogram {
    /// Pair a magnitude array with its normalization factor.
    ///
    /// # Errors
    /// Returns an error if `normalization` is not strictly positive and finite,
    /// or if any magnitude is negative or non-finite.
    pub fn new(data: Array2<f32>, normalization: f32) -> Result<Self, CoreError> {
        if !(normalization.is_finite() && normalization > 0.0) {
            return Err(CoreError::InvalidNormalization(normalization));
        }
        if data.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(CoreError::NegativeMagnitude);
        }
        Ok(Self {
            data,
            normalization,
        })
    }

    /// Normalized magnitudes.
    #[must_use]
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Scalar such that `raw = data * normalization`.
    #[must_use]
    pub fn normalization(&self) -> f32 {
        self.normalization
    }

    /// Number of frequency bins (rows).
    #[must_use]
    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Number of time bins (columns).
    #[must_use]
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    /// Reconstruct the un-normalized spectrogram.
    #[must_use]
    pub fn raw(&self) -> Array2<f32> {
        &self.data * self.normalization
    }

    /// Rows `y_min..y_max` over every time bin.
    ///
    /// Bounds are clamped to the spectrogram height.
    #[must_use]
    pub fn rows(&self, y_min: usize, y_max: usize) -> ArrayView2<'_, f32> {
        let hi = y_max.min(self.height());
        let lo = y_min.min(hi);
        self.data.slice(s![lo..hi, ..])
    }

    /// Crop the patch covered by `bbox`, clamped to the spectrogram extent.
    #[must_use]
    pub fn segment(&self, bbox: &BoundingBox) -> Array2<f32> {
        let y_hi = bbox.y_max.min(self.height());
        let y_lo = bbox.y_min.min(y_hi);
        let x_hi = bbox.x_max.min(self.width());
        let x_lo = bbox.x_min.min(x_hi);
        self.data.slice(s![y_lo..y_hi, x_lo..x_hi]).to_owned()
    }
}

/// Crop one segment per box row, in table order.
#[must_use]
pub fn extract_segments(spec: &Spectrogram, boxes: &[BoundingBox]) -> Vec<Array2<f32>> {
    boxes.iter().map(|b| spec.segment(b)).collect()
}
