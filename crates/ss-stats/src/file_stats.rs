//! Statistiques de premier ordre d'un fichier.
//!
//! Ligne produite : stats globales du spectrogramme brut, stats par bande
//! de fréquence (découpage `array_split`), puis géométrie des segments.

use anyhow::{Context, Result};
use ndarray::s;
use ss_core::record::{SEGMENT_STATS_LEN, row_len};
use ss_core::{BoundingBox, BoxTable, CoreError, FileStatsRow, Spectrogram, SpectrogramSource};

/// Descriptive statistics of a sample.
///
/// `variance` uses n - 1 in the denominator and is NaN for fewer than two
/// values. An empty sample gives NaN everywhere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Describe {
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample variance (n - 1).
    pub variance: f64,
}

impl Describe {
    /// Single-pass (Welford) description of `values`.
    ///
    /// # Example
    /// ```
    /// use ss_stats::file_stats::Describe;
    /// let d = Describe::of([1.0, 2.0, 3.0, 4.0]);
    /// assert_eq!((d.min, d.max, d.mean), (1.0, 4.0, 2.5));
    /// assert!((d.variance - 5.0 / 3.0).abs() < 1e-12);
    /// ```
    pub fn of(values: impl IntoIterator<Item = f64>) -> Self {
        let mut n = 0usize;
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut mean, mut m2) = (0.0f64, 0.0f64);

        for v in values {
            n += 1;
            min = min.min(v);
            max = max.max(v);
            let delta = v - mean;
            mean += delta / n as f64;
            m2 += delta * (v - mean);
        }

        if n == 0 {
            return Self {
                min: f64::NAN,
                max: f64::NAN,
                mean: f64::NAN,
                variance: f64::NAN,
            };
        }
        let variance = if n > 1 { m2 / (n - 1) as f64 } else { f64::NAN };
        Self {
            min,
            max,
            mean,
            variance,
        }
    }

    fn push_into(self, row: &mut FileStatsRow) {
        row.extend([self.min, self.max, self.mean, self.variance]);
    }
}

/// Row ranges of `k` contiguous bands over `rows` rows.
///
/// The first `rows % k` bands get one extra row.
///
/// # Errors
/// Returns `CoreError::BandCountExceedsHeight` if `k > rows`, and
/// `CoreError::Config` if `k == 0`.
///
/// # Example
/// ```
/// use ss_stats::file_stats::band_ranges;
/// assert_eq!(band_ranges(10, 3).unwrap(), vec![0..4, 4..7, 7..10]);
/// assert!(band_ranges(2, 3).is_err());
/// ```
pub fn band_ranges(rows: usize, k: usize) -> Result<Vec<std::ops::Range<usize>>, CoreError> {
    if k == 0 {
        return Err(CoreError::Config(
            "num_frequency_bands must be >= 1".to_string(),
        ));
    }
    if k > rows {
        return Err(CoreError::BandCountExceedsHeight {
            bands: k,
            height: rows,
        });
    }
    let base = rows / k;
    let extra = rows % k;
    let mut start = 0;
    Ok((0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect())
}

/// Min, max, mean, sample std of (width, height, y_min) over all boxes.
///
/// Layout: `[min w, min h, min y, max w, max h, max y, mean w, mean h,
/// mean y, std w, std h, std y]`. Zero boxes give twelve zeros.
#[must_use]
pub fn segment_stats(boxes: &[BoundingBox]) -> [f64; SEGMENT_STATS_LEN] {
    let mut out = [0.0; SEGMENT_STATS_LEN];
    if boxes.is_empty() {
        return out;
    }

    let columns: [fn(&BoundingBox) -> usize; 3] =
        [BoundingBox::width, BoundingBox::height, |b| b.y_min];
    for (c, get) in columns.iter().enumerate() {
        let d = Describe::of(boxes.iter().map(|b| get(b) as f64));
        out[c] = d.min;
        out[3 + c] = d.max;
        out[6 + c] = d.mean;
        out[9 + c] = d.variance.sqrt();
    }
    out
}

/// FileStatsRow for a spectrogram and its boxes.
///
/// # Errors
/// Returns an error if the band count is zero or exceeds the spectrogram
/// height.
pub fn compute_row(
    spec: &Spectrogram,
    boxes: &[BoundingBox],
    num_frequency_bands: usize,
) -> Result<FileStatsRow, CoreError> {
    let bands = band_ranges(spec.height(), num_frequency_bands)?;
    let raw = spec.raw();
    let widen = |v: &f32| f64::from(*v);

    let mut row = Vec::with_capacity(row_len(num_frequency_bands));
    Describe::of(raw.iter().map(widen)).push_into(&mut row);
    for band in bands {
        Describe::of(raw.slice(s![band, ..]).iter().map(widen)).push_into(&mut row);
    }
    row.extend(segment_stats(boxes));

    debug_assert_eq!(row.len(), row_len(num_frequency_bands));
    Ok(row)
}

/// Result of [`file_stats`]: the loaded data plus its row.
#[derive(Clone, Debug)]
pub struct FileStats {
    /// Segment boxes of the file.
    pub boxes: BoxTable,
    /// Normalized spectrogram and its factor.
    pub spectrogram: Spectrogram,
    /// First-order statistics.
    pub row: FileStatsRow,
}

/// Load `label` from `source` and compute its first-order statistics.
///
/// # Errors
/// Returns an error naming the label if loading fails or the band count
/// does not fit the spectrogram.
pub fn file_stats(
    label: &str,
    source: &dyn SpectrogramSource,
    num_frequency_bands: usize,
) -> Result<FileStats> {
    let (boxes, spectrogram) = source
        .load(label)
        .with_context(|| format!("Cannot load spectrogram for '{label}'"))?;
    let row = compute_row(&spectrogram, &boxes, num_frequency_bands)
        .with_context(|| format!("Cannot compute file stats for '{label}'"))?;
    Ok(FileStats {
        boxes,
        spectrogram,
        row,
    })
}
