use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::CoreError;

/// One-hot class vector of a single sample.
///
/// # Example
/// ```
/// use ss_core::labels::LabelRow;
/// let a = LabelRow::new(vec![1.0, 0.0, 0.0]);
/// let b = LabelRow::new(vec![0.0, 0.0, 1.0]);
/// assert!(!a.overlaps(&b));
/// assert_eq!(a.union(&b).values(), &[1.0, 0.0, 1.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct LabelRow {
    values: Vec<f32>,
}

impl LabelRow {
    /// Wrap a class vector.
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Class presence values, one per column of the table.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// True if both rows mark at least one common class as present.
    #[must_use]
    pub fn overlaps(&self, other: &LabelRow) -> bool {
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a * b)
            .sum::<f32>()
            > 0.0
    }

    /// Element-wise maximum: a class is present if present in either row.
    #[must_use]
    pub fn union(&self, other: &LabelRow) -> LabelRow {
        LabelRow {
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| a.max(*b))
                .collect(),
        }
    }
}

/// Table ordonnée des labels du corpus.
///
/// Chaque ligne associe un label (chemin ou identifiant de fichier) à un
/// vecteur one-hot de classes. L'ordre des lignes est l'ordre de référence
/// utilisé pour indexer les résultats.
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
    classes: Vec<String>,
    labels: Vec<String>,
    rows: Vec<LabelRow>,
    index: HashMap<String, usize>,
}

impl LabelTable {
    /// Build a table from class names and `(label, values)` rows.
    ///
    /// # Errors
    /// Returns `CoreError::Config` for duplicate labels or rows whose width
    /// differs from the class count.
    pub fn from_rows(
        classes: Vec<String>,
        rows: impl IntoIterator<Item = (String, Vec<f32>)>,
    ) -> Result<Self, CoreError> {
        let mut table = Self {
            classes,
            ..Self::default()
        };
        for (label, values) in rows {
            if values.len() != table.classes.len() {
                return Err(CoreError::Config(format!(
                    "label {label} has {} values for {} classes",
                    values.len(),
                    table.classes.len()
                )));
            }
            if table.index.contains_key(&label) {
                return Err(CoreError::Config(format!("duplicate label {label}")));
            }
            table.index.insert(label.clone(), table.labels.len());
            table.labels.push(label);
            table.rows.push(LabelRow::new(values));
        }
        Ok(table)
    }

    /// Load a comma-separated table whose first column is the label and the
    /// remaining columns are numeric class values.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a line is malformed.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read label table {}", path.display()))?;
        let table = Self::parse_csv(&content, &path.display().to_string())?;
        log::info!(
            "Loaded {} labels x {} classes from {}",
            table.len(),
            table.classes.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse CSV content; `origin` is only used in error messages.
    ///
    /// # Errors
    /// Returns `CoreError::LabelTable` on a missing header, wrong field count
    /// or non-numeric value.
    pub fn parse_csv(content: &str, origin: &str) -> Result<Self, CoreError> {
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let Some((_, header)) = lines.next() else {
            return Err(CoreError::LabelTable {
                path: origin.to_string(),
                line: 1,
                reason: "missing header".into(),
            });
        };
        let classes: Vec<String> = split_fields(header).skip(1).collect();

        let mut rows = Vec::new();
        for (idx, line) in lines {
            let mut fields = split_fields(line);
            let label = fields.next().unwrap_or_default();
            let values = fields
                .map(|f| f.parse::<f32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| CoreError::LabelTable {
                    path: origin.to_string(),
                    line: idx + 1,
                    reason: e.to_string(),
                })?;
            if values.len() != classes.len() {
                return Err(CoreError::LabelTable {
                    path: origin.to_string(),
                    line: idx + 1,
                    reason: format!("expected {} values, got {}", classes.len(), values.len()),
                });
            }
            rows.push((label, values));
        }

        Self::from_rows(classes, rows)
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if the table holds no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Class column names.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Labels in table order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Label at position `idx`.
    #[must_use]
    pub fn label(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    /// Class vector at position `idx`.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<&LabelRow> {
        self.rows.get(idx)
    }

    /// Position of `label` in table order.
    #[must_use]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Column index of a class name.
    #[must_use]
    pub fn class_index(&self, class: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == class)
    }

    /// Positions of every row where `class` is present.
    #[must_use]
    pub fn positions_with_class(&self, class_idx: usize) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.values().get(class_idx).is_some_and(|v| *v > 0.0))
            .map(|(i, _)| i)
            .collect()
    }

    /// Per-class sum of the label columns.
    #[must_use]
    pub fn class_counts(&self) -> Vec<(String, f32)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(c, name)| {
                let count: f32 = self.rows.iter().map(|r| r.values()[c]).sum();
                (name.clone(), count)
            })
            .collect()
    }
}

fn split_fields(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(',')
        .map(|f| f.trim().trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "filename,robin,wren,owl\n\
                       a.wav,1,0,0\n\
                       b.wav,0,1,1\n\
                       \n\
                       c.wav,1,1,0\n";

    #[test]
    fn parse_keeps_order_and_positions() {
        let table = LabelTable::parse_csv(CSV, "mem").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.classes(), ["robin", "wren", "owl"]);
        assert_eq!(table.position("c.wav"), Some(2));
        assert_eq!(table.label(1), Some("b.wav"));
        assert_eq!(table.row(1).unwrap().values(), &[0.0, 1.0, 1.0]);
    }

    #[test]
    fn class_counts_sum_columns() {
        let table = LabelTable::parse_csv(CSV, "mem").unwrap();
        let counts = table.class_counts();
        assert_eq!(counts[0], ("robin".to_string(), 2.0));
        assert_eq!(counts[2], ("owl".to_string(), 1.0));
        assert_eq!(table.positions_with_class(1), vec![1, 2]);
    }

    #[test]
    fn wrong_width_is_reported_with_line() {
        let err = LabelTable::parse_csv("f,a,b\nx.wav,1\n", "bad.csv").unwrap_err();
        assert!(matches!(err, CoreError::LabelTable { line: 2, .. }));
    }

    #[test]
    fn duplicate_labels_rejected() {
        let res = LabelTable::from_rows(
            vec!["a".into()],
            vec![("x".into(), vec![1.0]), ("x".into(), vec![0.0])],
        );
        assert!(res.is_err());
    }

    #[test]
    fn from_csv_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, CSV).unwrap();
        let table = LabelTable::from_csv(&path).unwrap();
        assert_eq!(table.labels().len(), 3);
    }
}
