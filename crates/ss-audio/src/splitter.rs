//! Découpage de longs enregistrements WAV en clips de durée fixe.
//!
//! Chaque clip est écrit sous un nom dérivé du digest SHA-256 de
//! `"{wav}-{begin}-{end}"` et décrit par une ligne séparée par
//! `column_separator`. Avec les annotations Raven activées, seuls les clips
//! qui chevauchent une annotation sont conservés, suivis de leurs classes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::audio::Audio;
use crate::error::AudioError;

/// Suffix of the Raven selection table expected next to each WAV file.
pub const RAVEN_TABLE_SUFFIX: &str = ".Table.1.selections.txt.lower";

/// Options du découpage.
#[derive(Clone, Debug)]
pub struct SplitterOptions {
    /// Look for a Raven selection table next to each WAV.
    pub annotations: bool,
    /// CSV with `raw,corrected` columns rewriting annotation classes.
    pub label_corrections: Option<PathBuf>,
    /// Overlap between consecutive clips, seconds.
    pub overlap: f64,
    /// Clip length, seconds.
    pub duration: f64,
    /// Where clips are written.
    pub output_directory: PathBuf,
    /// Emit a final clip aligned on the end of the recording.
    pub include_last_segment: bool,
    /// Separator between output columns.
    pub column_separator: String,
    /// Separator between classes in the last column.
    pub species_separator: String,
}

impl Default for SplitterOptions {
    fn default() -> Self {
        Self {
            annotations: false,
            label_corrections: None,
            overlap: 1.0,
            duration: 5.0,
            output_directory: PathBuf::from("segments"),
            include_last_segment: false,
            column_separator: "\t".to_string(),
            species_separator: "|".to_string(),
        }
    }
}

/// One Raven selection.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// Start, seconds.
    pub begin: f64,
    /// End, seconds.
    pub end: f64,
    /// Class name (`"unknown"` when the column is empty).
    pub class: String,
}

impl Annotation {
    /// Starts inside `[begin, end)` or ends inside `(begin, end]`.
    #[must_use]
    pub fn overlaps(&self, begin: f64, end: f64) -> bool {
        (self.begin >= begin && self.begin < end) || (self.end > begin && self.end <= end)
    }
}

/// Parse a tab-separated Raven selection table.
///
/// Columns are located by header name (case-insensitive): `begin time (s)`,
/// `end time (s)` and `class`. Rows come back sorted by begin time.
///
/// # Errors
/// Returns `AudioError::Annotation` if a column is missing or a time does
/// not parse.
pub fn parse_raven_table(content: &str, origin: &str) -> Result<Vec<Annotation>, AudioError> {
    let err = |reason: String| AudioError::Annotation {
        path: origin.to_string(),
        reason,
    };

    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = lines
        .next()
        .ok_or_else(|| err("empty table".to_string()))?
        .split('\t')
        .map(|h| h.trim().to_lowercase())
        .collect();
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| err(format!("missing column '{name}'")))
    };
    let begin_col = column("begin time (s)")?;
    let end_col = column("end time (s)")?;
    let class_col = column("class")?;

    let mut out = Vec::new();
    for (n, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let time = |col: usize| -> Result<f64, AudioError> {
            fields
                .get(col)
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(|| err(format!("row {}: bad time in column {col}", n + 2)))
        };
        let class = fields
            .get(class_col)
            .filter(|c| !c.is_empty())
            .map_or_else(|| "unknown".to_string(), |c| (*c).to_string());
        out.push(Annotation {
            begin: time(begin_col)?,
            end: time(end_col)?,
            class,
        });
    }

    out.sort_by(|a, b| a.begin.total_cmp(&b.begin));
    Ok(out)
}

/// Parse a `raw,corrected` CSV into a lookup table.
///
/// # Errors
/// Returns `AudioError::Annotation` if the header lacks either column.
pub fn parse_label_corrections(
    content: &str,
    origin: &str,
) -> Result<HashMap<String, String>, AudioError> {
    let err = |reason: &str| AudioError::Annotation {
        path: origin.to_string(),
        reason: reason.to_string(),
    };
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| err("empty table"))?
        .split(',')
        .map(|h| h.trim().trim_matches('"'))
        .collect();
    let raw = header
        .iter()
        .position(|h| *h == "raw")
        .ok_or_else(|| err("missing column 'raw'"))?;
    let corrected = header
        .iter()
        .position(|h| *h == "corrected")
        .ok_or_else(|| err("missing column 'corrected'"))?;

    let mut table = HashMap::new();
    for line in lines {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim().trim_matches('"')).collect();
        if let (Some(r), Some(c)) = (fields.get(raw), fields.get(corrected)) {
            table.insert((*r).to_string(), (*c).to_string());
        }
    }
    Ok(table)
}

/// `(begin, end)` windows in seconds for a recording of `wav_duration`.
///
/// Windows advance by `duration - overlap`. The final window is dropped
/// unless `include_last` is set, in which case it is aligned on the end of
/// the recording.
///
/// # Errors
/// Returns `AudioError::InvalidSplit` unless `duration > overlap >= 0`.
///
/// # Example
/// ```
/// use ss_audio::splitter::clip_windows;
/// let w = clip_windows(12.0, 5.0, 1.0, true).unwrap();
/// assert_eq!(w, vec![(0.0, 5.0), (4.0, 9.0), (7.0, 12.0)]);
/// ```
pub fn clip_windows(
    wav_duration: f64,
    duration: f64,
    overlap: f64,
    include_last: bool,
) -> Result<Vec<(f64, f64)>, AudioError> {
    let valid = duration > overlap && overlap >= 0.0;
    if !valid {
        return Err(AudioError::InvalidSplit { duration, overlap });
    }
    let step = duration - overlap;
    let count = ((wav_duration - overlap) / step).ceil().max(0.0) as usize;

    let mut windows = Vec::with_capacity(count);
    for idx in 0..count {
        if idx + 1 == count {
            if include_last {
                windows.push(((wav_duration - duration).max(0.0), wav_duration));
            }
        } else {
            let begin = step * idx as f64;
            windows.push((begin, begin + duration));
        }
    }
    Ok(windows)
}

/// Hex SHA-256 of `"{wav}-{begin}-{end}"`.
#[must_use]
pub fn clip_digest(wav: &Path, begin: f64, end: f64) -> String {
    let unique = format!("{}-{begin}-{end}", wav.display());
    format!("{:x}", Sha256::digest(unique.as_bytes()))
}

/// Splits a list of WAV files into clips.
pub struct SplitterDataset {
    wavs: Vec<PathBuf>,
    options: SplitterOptions,
    corrections: Option<HashMap<String, String>>,
}

impl SplitterDataset {
    /// Build the dataset, reading the label-correction table if configured.
    ///
    /// # Errors
    /// Returns an error if the split geometry is invalid or the correction
    /// table cannot be read.
    pub fn new(wavs: Vec<PathBuf>, options: SplitterOptions) -> Result<Self> {
        clip_windows(0.0, options.duration, options.overlap, false)?;
        let corrections = match &options.label_corrections {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Cannot read label corrections {}", path.display()))?;
                Some(parse_label_corrections(&content, &path.display().to_string())?)
            }
            None => None,
        };
        Ok(Self {
            wavs,
            options,
            corrections,
        })
    }

    /// Number of source recordings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.wavs.len()
    }

    /// No source recordings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wavs.is_empty()
    }

    fn annotation_path(wav: &Path) -> PathBuf {
        let stem = wav.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let prefix = stem.split('.').next().unwrap_or(stem);
        wav.with_file_name(format!("{prefix}{RAVEN_TABLE_SUFFIX}"))
    }

    fn load_annotations(&self, path: &Path) -> Result<Vec<Annotation>> {
        let origin = path.display().to_string();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Cannot read annotations {origin}"))?;
        let mut annotations = parse_raven_table(&content, &origin)?;
        if let Some(corrections) = &self.corrections {
            for a in &mut annotations {
                let fixed = corrections.get(&a.class).ok_or_else(|| AudioError::Annotation {
                    path: origin.clone(),
                    reason: format!("no correction for class '{}'", a.class),
                })?;
                a.class.clone_from(fixed);
            }
        }
        Ok(annotations)
    }

    /// Split recording `idx`, write its clips and return one row per clip.
    ///
    /// Rows are `wav, [annotation_file,] begin, end, clip_path[, classes]`.
    /// A recording without its annotation table yields no rows.
    ///
    /// # Errors
    /// Returns an error naming the recording if decoding, parsing or writing
    /// fails.
    pub fn get(&self, idx: usize) -> Result<Vec<String>> {
        let Some(wav) = self.wavs.get(idx) else {
            return Ok(Vec::new());
        };
        let opts = &self.options;

        let annotations = if opts.annotations {
            let table = Self::annotation_path(wav);
            if !table.is_file() {
                log::warn!("Found no Raven annotations for {}", wav.display());
                return Ok(Vec::new());
            }
            Some((table.clone(), self.load_annotations(&table)?))
        } else {
            None
        };

        let audio = Audio::from_file(wav, None)?;
        let windows = clip_windows(
            audio.duration(),
            opts.duration,
            opts.overlap,
            opts.include_last_segment,
        )?;
        let sr = f64::from(audio.sample_rate());
        let last_time = audio.samples().len().saturating_sub(1) as f64 / sr;

        let mut rows = Vec::new();
        for (begin, end) in windows {
            let mut columns = vec![wav.display().to_string()];
            let mut classes = None;

            if let Some((table, list)) = &annotations {
                let mut present: Vec<&str> = Vec::new();
                for a in list.iter().filter(|a| a.overlaps(begin, end)) {
                    if !present.contains(&a.class.as_str()) {
                        present.push(&a.class);
                    }
                }
                if present.is_empty() {
                    continue;
                }
                columns.push(table.display().to_string());
                classes = Some(present.join(&opts.species_separator));
            }

            let destination = opts
                .output_directory
                .join(format!("{}.wav", clip_digest(wav, begin, end)));
            audio
                .trim(begin, end)
                .and_then(|clip| clip.save(&destination))
                .with_context(|| format!("Cannot write clip {begin}-{end} of {}", wav.display()))?;

            let begin_time = audio.time_to_sample(begin) as f64 / sr;
            let end_time = (audio.time_to_sample(end) as f64 / sr).min(last_time);
            columns.push(begin_time.to_string());
            columns.push(end_time.to_string());
            columns.push(destination.display().to_string());
            columns.extend(classes);
            rows.push(columns.join(&opts.column_separator));
        }

        log::debug!("{}: {} clips", wav.display(), rows.len());
        Ok(rows)
    }

    /// Split every recording in parallel and concatenate the rows in input
    /// order.
    ///
    /// # Errors
    /// Returns the first recording failure.
    pub fn split_all(&self) -> Result<Vec<String>> {
        fs::create_dir_all(&self.options.output_directory).with_context(|| {
            format!(
                "Cannot create output directory {}",
                self.options.output_directory.display()
            )
        })?;
        let per_file: Vec<Vec<String>> = (0..self.wavs.len())
            .into_par_iter()
            .map(|i| self.get(i))
            .collect::<Result<_>>()?;
        let rows: Vec<String> = per_file.into_iter().flatten().collect();
        log::info!("Split {} recordings into {} clips", self.wavs.len(), rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAVEN: &str = "Selection\tView\tBegin Time (s)\tEnd Time (s)\tClass\n\
                         2\tSpectrogram 1\t6.5\t7.5\tcardinal\n\
                         1\tSpectrogram 1\t0.5\t1.5\t\n";

    #[test]
    fn raven_table_sorted_and_defaulted() {
        let rows = parse_raven_table(RAVEN, "t.txt").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].class, "unknown");
        assert!((rows[0].begin - 0.5).abs() < 1e-12);
        assert_eq!(rows[1].class, "cardinal");
    }

    #[test]
    fn raven_table_requires_columns() {
        assert!(parse_raven_table("a\tb\n1\t2\n", "t.txt").is_err());
    }

    #[test]
    fn overlap_rule_matches_both_edges() {
        let a = Annotation {
            begin: 4.5,
            end: 5.5,
            class: "x".into(),
        };
        assert!(a.overlaps(0.0, 5.0));
        assert!(a.overlaps(5.0, 10.0));
        assert!(!a.overlaps(6.0, 10.0));
    }

    #[test]
    fn windows_drop_last_by_default() {
        let w = clip_windows(12.0, 5.0, 1.0, false).unwrap();
        assert_eq!(w, vec![(0.0, 5.0), (4.0, 9.0)]);
        assert!(clip_windows(12.0, 1.0, 1.0, false).is_err());
    }

    #[test]
    fn digest_is_stable_and_distinct() {
        let a = clip_digest(Path::new("a.wav"), 0.0, 5.0);
        assert_eq!(a, clip_digest(Path::new("a.wav"), 0.0, 5.0));
        assert_ne!(a, clip_digest(Path::new("a.wav"), 4.0, 9.0));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn corrections_table_parses() {
        let t = parse_label_corrections("raw,corrected\nunknown,noise\ncard,cardinal\n", "c.csv")
            .unwrap();
        assert_eq!(t.get("card").map(String::as_str), Some("cardinal"));
        assert!(parse_label_corrections("a,b\n", "c.csv").is_err());
    }

    #[test]
    fn split_with_annotations_keeps_overlapping_clips() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("rec.wav");
        Audio::new(vec![0.1; 1200], 100).save(&wav).unwrap();
        fs::write(dir.path().join(format!("rec{RAVEN_TABLE_SUFFIX}")), RAVEN).unwrap();
        fs::write(
            dir.path().join("fix.csv"),
            "raw,corrected\nunknown,noise\ncardinal,cardinal\n",
        )
        .unwrap();

        let options = SplitterOptions {
            annotations: true,
            label_corrections: Some(dir.path().join("fix.csv")),
            output_directory: dir.path().join("clips"),
            include_last_segment: true,
            ..SplitterOptions::default()
        };
        let dataset = SplitterDataset::new(vec![wav], options).unwrap();
        let rows = dataset.split_all().unwrap();

        // windows 0-5, 4-9, 7-12: first has noise, second and third cardinal
        assert_eq!(rows.len(), 3);
        assert!(rows[0].ends_with("\tnoise"));
        assert!(rows[1].ends_with("\tcardinal"));
        let clip = rows[0].split('\t').nth(4).unwrap();
        assert_eq!(Audio::from_file(clip, None).unwrap().samples().len(), 500);
    }

    #[test]
    fn missing_annotations_yield_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("lonely.wav");
        Audio::new(vec![0.0; 1000], 100).save(&wav).unwrap();
        let options = SplitterOptions {
            annotations: true,
            output_directory: dir.path().join("clips"),
            ..SplitterOptions::default()
        };
        let dataset = SplitterDataset::new(vec![wav], options).unwrap();
        assert!(dataset.get(0).unwrap().is_empty());
    }
}
