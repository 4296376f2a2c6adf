use serde::{Deserialize, Serialize};

/// Number of descriptive statistics per block: min, max, mean, variance.
pub const STATS_PER_BLOCK: usize = 4;

/// Segment geometry block: min/max/mean/std over (width, height, y_min).
pub const SEGMENT_STATS_LEN: usize = 12;

/// Length of a [`FileStatsRow`] for a given band count.
///
/// # Example
/// ```
/// use ss_core::record::row_len;
/// assert_eq!(row_len(4), 4 + 16 + 12);
/// ```
#[must_use]
pub const fn row_len(num_frequency_bands: usize) -> usize {
    STATS_PER_BLOCK + STATS_PER_BLOCK * num_frequency_bands + SEGMENT_STATS_LEN
}

/// First-order statistics of one file, flattened.
///
/// Layout: `[global min, max, mean, var] ++ [band min, max, mean, var] * K ++
/// [seg min * 3, seg max * 3, seg mean * 3, seg std * 3]`.
/// Consumers index positionally, so the layout is fixed.
pub type FileStatsRow = Vec<f64>;

/// Best template-match result for one box of a compared file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStatsEntry {
    /// Maximum normalized correlation coefficient.
    pub score: f32,
    /// Time bin of the best match.
    pub x: usize,
    /// Frequency bin of the best match, on the reference's full axis.
    pub y: usize,
}

/// Everything persisted for one label by the statistics driver.
///
/// `match_stats[i]` holds the entries of the i-th label of the run's label
/// ordering; its length is that file's box count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileStatsRecord {
    /// Label of the reference file.
    pub label: String,
    /// First-order statistics.
    pub row: FileStatsRow,
    /// Second-order (template match) statistics, one block per label.
    pub match_stats: Vec<Vec<MatchStatsEntry>>,
}
