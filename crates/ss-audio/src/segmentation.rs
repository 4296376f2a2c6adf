use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array2;
use ss_core::config::SpectrogramParams;
use ss_core::{BoundingBox, BoxTable, Spectrogram};

use crate::audio::Audio;
use crate::stft::Stft;

/// Compute the normalised spectrogram and its segment boxes for one clip.
///
/// The magnitude spectrogram is divided by its maximum, which becomes the
/// normalization factor (a silent clip keeps a factor of 1). Boxes are the
/// bounding rectangles of 8-connected regions at or above
/// `params.segment_threshold` holding at least `params.min_segment_area`
/// cells.
///
/// # Errors
/// Returns an error if the spectrogram cannot be built (non-finite input).
pub fn spect_gen(audio: &Audio, params: &SpectrogramParams) -> Result<(BoxTable, Spectrogram)> {
    let mut stft = Stft::new(params.fft_size, params.hop_length);
    let mut data = stft.magnitude(audio.samples());

    let max = data.iter().copied().fold(0.0f32, f32::max);
    let normalization = if max > 0.0 { max } else { 1.0 };
    data.mapv_inplace(|v| v / normalization);

    let boxes = detect_boxes(&data, params.segment_threshold, params.min_segment_area);
    let spec = Spectrogram::new(data, normalization)?;
    Ok((boxes, spec))
}

/// Decode `path`, resample to `params.sample_rate` and run [`spect_gen`].
///
/// # Errors
/// Returns an error naming the file if decoding or generation fails.
pub fn spect_gen_file(path: &Path, params: &SpectrogramParams) -> Result<(BoxTable, Spectrogram)> {
    let audio = Audio::from_file(path, Some(params.sample_rate))
        .with_context(|| format!("Cannot load audio {}", path.display()))?;
    let out = spect_gen(&audio, params)
        .with_context(|| format!("Cannot build spectrogram for {}", path.display()))?;
    log::debug!(
        "{}: spectrogram {}x{}, {} boxes",
        path.display(),
        out.1.height(),
        out.1.width(),
        out.0.len()
    );
    Ok(out)
}

/// Bounding boxes of 8-connected regions where `data >= threshold`.
///
/// Regions smaller than `min_area` cells are dropped. Boxes are half-open and
/// sorted by `(x_min, y_min)`.
///
/// # Example
/// ```
/// use ndarray::array;
/// use ss_audio::segmentation::detect_boxes;
/// let data = array![[0.0, 1.0, 1.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
/// let boxes = detect_boxes(&data, 0.5, 1);
/// assert_eq!(boxes.len(), 1);
/// assert_eq!((boxes[0].x_min, boxes[0].x_max, boxes[0].y_min, boxes[0].y_max), (1, 3, 0, 2));
/// ```
#[must_use]
pub fn detect_boxes(data: &Array2<f32>, threshold: f32, min_area: usize) -> BoxTable {
    let (rows, cols) = data.dim();
    let mut visited = Array2::<bool>::from_elem((rows, cols), false);
    let mut boxes = BoxTable::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for x in 0..cols {
        for y in 0..rows {
            if visited[[y, x]] || data[[y, x]] < threshold {
                continue;
            }

            visited[[y, x]] = true;
            stack.push((y, x));
            let (mut y_lo, mut y_hi, mut x_lo, mut x_hi) = (y, y, x, x);
            let mut area = 0usize;

            while let Some((cy, cx)) = stack.pop() {
                area += 1;
                y_lo = y_lo.min(cy);
                y_hi = y_hi.max(cy);
                x_lo = x_lo.min(cx);
                x_hi = x_hi.max(cx);

                for ny in cy.saturating_sub(1)..=(cy + 1).min(rows - 1) {
                    for nx in cx.saturating_sub(1)..=(cx + 1).min(cols - 1) {
                        if !visited[[ny, nx]] && data[[ny, nx]] >= threshold {
                            visited[[ny, nx]] = true;
                            stack.push((ny, nx));
                        }
                    }
                }
            }

            if area >= min_area {
                boxes.push(BoundingBox {
                    x_min: x_lo,
                    x_max: x_hi + 1,
                    y_min: y_lo,
                    y_max: y_hi + 1,
                });
            }
        }
    }

    boxes.sort_by_key(|b| (b.x_min, b.y_min));
    boxes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    #[test]
    fn separate_regions_give_separate_boxes() {
        let mut data = Array2::<f32>::zeros((10, 12));
        data.slice_mut(s![1..3, 1..4]).fill(1.0);
        data.slice_mut(s![6..9, 8..11]).fill(0.9);
        let boxes = detect_boxes(&data, 0.5, 1);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0], BoundingBox::new(1, 4, 1, 3).unwrap());
        assert_eq!(boxes[1], BoundingBox::new(8, 11, 6, 9).unwrap());
    }

    #[test]
    fn diagonal_cells_are_connected() {
        let mut data = Array2::<f32>::zeros((4, 4));
        data[[0, 0]] = 1.0;
        data[[1, 1]] = 1.0;
        let boxes = detect_boxes(&data, 0.5, 1);
        assert_eq!(boxes, vec![BoundingBox::new(0, 2, 0, 2).unwrap()]);
    }

    #[test]
    fn small_regions_dropped() {
        let mut data = Array2::<f32>::zeros((5, 5));
        data[[2, 2]] = 1.0;
        assert!(detect_boxes(&data, 0.5, 2).is_empty());
    }

    #[test]
    fn spect_gen_normalises_to_unit_max() {
        let sr = 8000;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / sr as f32).sin())
            .collect();
        let audio = Audio::new(samples, sr);
        let params = SpectrogramParams {
            sample_rate: sr,
            fft_size: 256,
            hop_length: 128,
            segment_threshold: 0.5,
            min_segment_area: 4,
        };
        let (boxes, spec) = spect_gen(&audio, &params).unwrap();
        let max = spec.data().iter().copied().fold(0.0f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
        assert!(spec.normalization() > 1.0);
        assert!(!boxes.is_empty());
        // tone sits at bin 1000 / (8000 / 256) = 32
        assert!(boxes.iter().any(|b| b.y_min <= 32 && 32 < b.y_max));
    }

    #[test]
    fn silence_has_no_boxes() {
        let audio = Audio::new(vec![0.0; 4000], 8000);
        let (boxes, spec) = spect_gen(&audio, &SpectrogramParams::default()).unwrap();
        assert!(boxes.is_empty());
        assert!((spec.normalization() - 1.0).abs() < f32::EPSILON);
    }
}
