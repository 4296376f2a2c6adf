use ndarray::{Array2, ArrayView2};
use ss_core::MatchStatsEntry;

/// Relative variance under which a template or window counts as flat.
const FLAT_TOLERANCE: f64 = 1e-9;

/// Summed-area table with a zero border: `t[[y, x]]` is the sum of
/// `a[..y, ..x]`.
fn integral(a: &ArrayView2<'_, f32>, square: bool) -> Array2<f64> {
    let (h, w) = a.dim();
    let mut t = Array2::<f64>::zeros((h + 1, w + 1));
    for y in 0..h {
        let mut acc = 0.0;
        for x in 0..w {
            let v = f64::from(a[[y, x]]);
            acc += if square { v * v } else { v };
            t[[y + 1, x + 1]] = t[[y, x + 1]] + acc;
        }
    }
    t
}

fn window_sum(t: &Array2<f64>, y: usize, x: usize, h: usize, w: usize) -> f64 {
    t[[y + h, x + w]] - t[[y, x + w]] - t[[y + h, x]] + t[[y, x]]
}

/// Normalized correlation-coefficient map of `templ` slid over `image`.
///
/// Output has shape `(H - h + 1, W - w + 1)`. Each value is
/// `Σ T'·I' / sqrt(Σ T'² · Σ I'²)` with `T'`, `I'` the mean-removed template
/// and image window, clamped to `[-1, 1]`. A flat template or window scores
/// 0. Returns `None` if the template is empty or larger than the image in
/// either dimension.
///
/// # Example
/// ```
/// use ndarray::array;
/// use ss_stats::template::match_template;
/// let image = array![[0.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
/// let templ = array![[1.0f32, 0.0], [0.0, 0.0]];
/// let map = match_template(&image.view(), &templ.view()).unwrap();
/// assert_eq!(map.dim(), (2, 2));
/// assert!((map[[1, 1]] - 1.0).abs() < 1e-6);
/// ```
#[must_use]
pub fn match_template(image: &ArrayView2<'_, f32>, templ: &ArrayView2<'_, f32>) -> Option<Array2<f32>> {
    let (ih, iw) = image.dim();
    let (th, tw) = templ.dim();
    if th == 0 || tw == 0 || th > ih || tw > iw {
        return None;
    }

    let n = (th * tw) as f64;
    let t_mean = templ.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let t_centered = templ.mapv(|v| f64::from(v) - t_mean);
    let t_norm2 = t_centered.iter().map(|v| v * v).sum::<f64>();
    let t_energy = templ.iter().map(|&v| f64::from(v) * f64::from(v)).sum::<f64>();
    let t_flat = t_norm2 <= t_energy * FLAT_TOLERANCE;

    let sum = integral(image, false);
    let sum2 = integral(image, true);

    let (oh, ow) = (ih - th + 1, iw - tw + 1);
    let mut out = Array2::<f32>::zeros((oh, ow));
    for y in 0..oh {
        for x in 0..ow {
            // Σ T'·(I - mean I) == Σ T'·I since Σ T' == 0
            let mut num = 0.0f64;
            for ty in 0..th {
                for tx in 0..tw {
                    num += t_centered[[ty, tx]] * f64::from(image[[y + ty, x + tx]]);
                }
            }
            let s = window_sum(&sum, y, x, th, tw);
            let s2 = window_sum(&sum2, y, x, th, tw);
            let w_norm2 = s2 - s * s / n;
            if t_flat || w_norm2 <= s2 * FLAT_TOLERANCE {
                continue;
            }
            out[[y, x]] = (num / (t_norm2 * w_norm2).sqrt()).clamp(-1.0, 1.0) as f32;
        }
    }
    Some(out)
}

/// Global maximum of [`match_template`] as `(score, x, y)`.
///
/// Ties resolve to the first position in row-major order. `y` is relative
/// to the top of `image`.
#[must_use]
pub fn best_match(image: &ArrayView2<'_, f32>, templ: &ArrayView2<'_, f32>) -> Option<MatchStatsEntry> {
    let map = match_template(image, templ)?;
    let mut best: Option<MatchStatsEntry> = None;
    for ((y, x), &score) in map.indexed_iter() {
        if best.is_none_or(|b| score > b.score) {
            best = Some(MatchStatsEntry { score, x, y });
        }
    }
    best
}
