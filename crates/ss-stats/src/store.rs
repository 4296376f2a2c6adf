//! Persistance : cache de spectrogrammes (bincode) et résultats par label
//! (JSON).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ss_core::{BoxTable, FileStatsRecord, MatchStatsEntry, Spectrogram, SpectrogramSource, StatsSink};

use crate::error::StatsError;

/// File stem for a label: hex SHA-256 of the label, so distinct labels never
/// share a file. The label itself is kept inside the entry.
fn file_key(label: &str) -> String {
    format!("{:x}", Sha256::digest(label.as_bytes()))
}

fn check_label(requested: &str, stored: &str) -> Result<(), StatsError> {
    if requested == stored {
        Ok(())
    } else {
        Err(StatsError::LabelMismatch {
            requested: requested.to_string(),
            stored: stored.to_string(),
        })
    }
}

/// Write through a sibling temporary file, then rename into place.
fn write_atomically(path: &Path, write: impl FnOnce(&mut BufWriter<File>) -> Result<()>) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let file =
            File::create(&tmp).with_context(|| format!("Cannot create {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("Cannot move {} into place", path.display()))?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct StoredSpectrogram {
    label: String,
    boxes: BoxTable,
    spectrogram: Spectrogram,
}

/// Per-label spectrogram cache, one bincode file per label.
pub struct SpectrogramStore {
    dir: PathBuf,
}

impl SpectrogramStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create spectrogram store {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", file_key(label)))
    }

    /// Whether `label` has been stored.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.path_for(label).is_file()
    }

    /// Store `label`, replacing any previous entry.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn put(&self, label: &str, boxes: &BoxTable, spectrogram: &Spectrogram) -> Result<()> {
        let entry = StoredSpectrogram {
            label: label.to_string(),
            boxes: boxes.clone(),
            spectrogram: spectrogram.clone(),
        };
        write_atomically(&self.path_for(label), |w| {
            bincode::serialize_into(w, &entry)
                .with_context(|| format!("Cannot serialize spectrogram for '{label}'"))
        })
    }
}

impl SpectrogramSource for SpectrogramStore {
    fn load(&self, label: &str) -> Result<(BoxTable, Spectrogram)> {
        let path = self.path_for(label);
        if !path.is_file() {
            return Err(StatsError::Missing {
                label: label.to_string(),
            }
            .into());
        }
        let file = File::open(&path).with_context(|| format!("Cannot open {}", path.display()))?;
        let entry: StoredSpectrogram = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("Corrupt spectrogram entry {}", path.display()))?;
        check_label(label, &entry.label)?;
        Ok((entry.boxes, entry.spectrogram))
    }
}

/// On-disk form of a record. Non-finite statistics (a single-box std) are
/// stored as `null`.
#[derive(Serialize, Deserialize)]
struct JsonRecord {
    label: String,
    row: Vec<Option<f64>>,
    match_stats: Vec<Vec<MatchStatsEntry>>,
}

/// Writes one pretty-printed JSON document per label.
pub struct JsonStatsStore {
    dir: PathBuf,
}

impl JsonStatsStore {
    /// Open (creating if needed) a result directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create results directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_key(label)))
    }

    /// Read back the record of `label`.
    ///
    /// # Errors
    /// Returns an error if the document is missing, malformed, or holds
    /// another label.
    pub fn read(&self, label: &str) -> Result<FileStatsRecord> {
        let path = self.path_for(label);
        let file = File::open(&path).with_context(|| format!("Cannot open {}", path.display()))?;
        let doc: JsonRecord = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Malformed stats document {}", path.display()))?;
        check_label(label, &doc.label)?;
        Ok(FileStatsRecord {
            label: doc.label,
            row: doc.row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
            match_stats: doc.match_stats,
        })
    }
}

impl StatsSink for JsonStatsStore {
    fn write(&self, record: FileStatsRecord) -> Result<()> {
        let path = self.path_for(&record.label);
        let doc = JsonRecord {
            row: record.row.iter().map(|v| v.is_finite().then_some(*v)).collect(),
            label: record.label,
            match_stats: record.match_stats,
        };
        write_atomically(&path, |w| {
            serde_json::to_writer_pretty(w, &doc)
                .with_context(|| format!("Cannot write {}", path.display()))
        })
    }
}

/// In-memory sink keyed by label.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<HashMap<String, FileStatsRecord>>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every stored record.
    ///
    /// # Errors
    /// Returns an error if a writer panicked while holding the lock.
    pub fn into_records(self) -> Result<HashMap<String, FileStatsRecord>> {
        self.records
            .into_inner()
            .map_err(|_| anyhow!("memory sink lock poisoned"))
    }
}

impl StatsSink for MemorySink {
    fn write(&self, record: FileStatsRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?;
        records.insert(record.label.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ss_core::BoundingBox;

    #[test]
    fn spectrogram_store_round_trip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpectrogramStore::open(dir.path().join("specs")).unwrap();
        let spec = Spectrogram::new(array![[0.1, 0.2], [0.3, 1.0]], 12.5).unwrap();
        let boxes = vec![BoundingBox::new(0, 1, 0, 2).unwrap()];

        store.put("site1/rec.wav", &boxes, &spec).unwrap();
        assert!(store.contains("site1/rec.wav"));
        let (b, s) = store.load("site1/rec.wav").unwrap();
        assert_eq!(b, boxes);
        assert_eq!(s, spec);

        let err = store.load("nope.wav").unwrap_err();
        assert!(err.to_string().contains("nope.wav"));
    }

    #[test]
    fn json_store_keeps_nan_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStatsStore::open(dir.path()).unwrap();
        let record = FileStatsRecord {
            label: "a.wav".into(),
            row: vec![1.0, f64::NAN, 3.0],
            match_stats: vec![vec![], vec![MatchStatsEntry { score: 0.5, x: 2, y: 3 }]],
        };
        store.write(record).unwrap();

        let text = fs::read_to_string(store.path_for("a.wav")).unwrap();
        assert!(text.contains("null"));
        let back = store.read("a.wav").unwrap();
        assert!(back.row[1].is_nan());
        assert_eq!(back.match_stats[1][0].x, 2);
    }

    #[test]
    fn separator_lookalike_labels_get_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let specs = SpectrogramStore::open(dir.path().join("specs")).unwrap();
        let results = JsonStatsStore::open(dir.path().join("results")).unwrap();
        let boxes = vec![BoundingBox::new(0, 1, 0, 1).unwrap()];

        for (label, value) in [("site/x.wav", 0.25_f32), ("site__x.wav", 0.75)] {
            let spec = Spectrogram::new(array![[value, 1.0]], 2.0).unwrap();
            specs.put(label, &boxes, &spec).unwrap();
            results
                .write(FileStatsRecord {
                    label: label.into(),
                    row: vec![f64::from(value)],
                    match_stats: vec![],
                })
                .unwrap();
        }

        assert_eq!(specs.load("site/x.wav").unwrap().1.data()[[0, 0]], 0.25);
        assert_eq!(specs.load("site__x.wav").unwrap().1.data()[[0, 0]], 0.75);
        assert_eq!(results.read("site/x.wav").unwrap().row, vec![0.25]);
        assert_eq!(results.read("site__x.wav").unwrap().label, "site__x.wav");
    }

    #[test]
    fn entry_under_wrong_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpectrogramStore::open(dir.path()).unwrap();
        let spec = Spectrogram::new(array![[0.5]], 1.0).unwrap();
        store.put("a.wav", &Vec::new(), &spec).unwrap();
        fs::rename(store.path_for("a.wav"), store.path_for("b.wav")).unwrap();

        let err = store.load("b.wav").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StatsError>(),
            Some(StatsError::LabelMismatch { stored, .. }) if stored == "a.wav"
        ));

        let results = JsonStatsStore::open(dir.path().join("results")).unwrap();
        results
            .write(FileStatsRecord {
                label: "a.wav".into(),
                row: vec![],
                match_stats: vec![],
            })
            .unwrap();
        fs::rename(results.path_for("a.wav"), results.path_for("b.wav")).unwrap();
        assert!(results.read("b.wav").is_err());
    }

    #[test]
    fn inverted_box_on_disk_is_rejected() {
        #[derive(Serialize)]
        struct Entry {
            label: String,
            boxes: Vec<[usize; 4]>,
            spectrogram: (ndarray::Array2<f32>, f32),
        }

        let dir = tempfile::tempdir().unwrap();
        let store = SpectrogramStore::open(dir.path()).unwrap();
        let entry = Entry {
            label: "bad.wav".into(),
            boxes: vec![[5, 1, 0, 1]],
            spectrogram: (array![[0.5, 1.0]], 1.0),
        };
        fs::write(store.path_for("bad.wav"), bincode::serialize(&entry).unwrap()).unwrap();

        let err = store.load("bad.wav").unwrap_err();
        assert!(format!("{err:#}").contains("Corrupt"), "{err:#}");
    }

    #[test]
    fn memory_sink_keys_by_label() {
        let sink = MemorySink::new();
        for label in ["x", "y", "x"] {
            sink.write(FileStatsRecord {
                label: label.into(),
                row: vec![],
                match_stats: vec![],
            })
            .unwrap();
        }
        assert_eq!(sink.into_records().unwrap().len(), 2);
    }
}
