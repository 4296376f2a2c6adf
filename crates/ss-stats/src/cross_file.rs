//! Statistiques de second ordre : chaque segment d'un fichier B est glissé
//! sur une bande de fréquences du spectrogramme de référence A.

use anyhow::{Context, Result};
use ss_core::spectrogram::extract_segments;
use ss_core::{BoundingBox, MatchStatsEntry, Spectrogram, SpectrogramSource};

use crate::template::best_match;

/// Frequency rows of the reference searched for `bbox`.
///
/// `max(0, y_min - buffer)..min(height, y_max + buffer)` on the reference.
#[must_use]
pub fn search_window(bbox: &BoundingBox, reference_height: usize, buffer: usize) -> (usize, usize) {
    let lo = bbox.y_min.saturating_sub(buffer);
    let hi = bbox.y_max.saturating_add(buffer).min(reference_height);
    (lo, hi)
}

/// Best match of every box of a compared file over the reference.
///
/// One entry per box in table order. A box whose search window exceeds the
/// reference height, whose template is wider than the reference, or whose
/// window is empty or shorter than the template keeps `(0, 0, 0)`.
///
/// # Example
/// ```
/// use ndarray::Array2;
/// use ss_core::{BoundingBox, Spectrogram};
/// use ss_stats::cross_file::match_boxes;
///
/// let reference = Spectrogram::new(Array2::zeros((8, 4)), 1.0).unwrap();
/// let other = Spectrogram::new(Array2::zeros((8, 10)), 1.0).unwrap();
/// // 6 columns wide, reference has 4
/// let wide = BoundingBox::new(0, 6, 2, 4).unwrap();
/// let entries = match_boxes(&reference, &[wide], &other, 1);
/// assert_eq!(entries[0].score, 0.0);
/// assert_eq!((entries[0].x, entries[0].y), (0, 0));
/// ```
#[must_use]
pub fn match_boxes(
    reference: &Spectrogram,
    boxes: &[BoundingBox],
    other: &Spectrogram,
    buffer: usize,
) -> Vec<MatchStatsEntry> {
    let segments = extract_segments(other, boxes);
    let mut entries = vec![MatchStatsEntry::default(); boxes.len()];

    for ((bbox, templ), entry) in boxes.iter().zip(&segments).zip(entries.iter_mut()) {
        let (lo, hi) = search_window(bbox, reference.height(), buffer);
        let window_height = hi.saturating_sub(lo);
        if window_height > reference.height()
            || templ.ncols() > reference.width()
            || window_height == 0
            || window_height < templ.nrows()
        {
            continue;
        }

        let region = reference.rows(lo, hi);
        if let Some(best) = best_match(&region, &templ.view()) {
            *entry = MatchStatsEntry {
                score: best.score,
                x: best.x,
                y: best.y + lo,
            };
        }
    }

    entries
}

/// Match every file of `labels` (except position `skip`) against
/// `reference`.
///
/// The result has one block per label, indexed by the label's position in
/// `labels` whatever order the source yields them in. The skipped position
/// holds an empty block.
///
/// # Errors
/// Returns an error naming the compared label if it cannot be loaded.
pub fn file_file_stats(
    reference: &Spectrogram,
    labels: &[String],
    skip: Option<usize>,
    source: &dyn SpectrogramSource,
    buffer: usize,
) -> Result<Vec<Vec<MatchStatsEntry>>> {
    let positions: Vec<usize> = (0..labels.len()).filter(|&i| Some(i) != skip).collect();
    let others: Vec<String> = positions.iter().map(|&i| labels[i].clone()).collect();

    let mut match_stats = vec![Vec::new(); labels.len()];
    for (pos, item) in source.cursor(&others) {
        let position = positions[pos];
        let (boxes, spec) =
            item.with_context(|| format!("Cannot load compared file '{}'", labels[position]))?;
        match_stats[position] = match_boxes(reference, &boxes, &spec, buffer);
    }
    Ok(match_stats)
}
