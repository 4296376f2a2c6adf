//! Configuration, types, and shared structures for songscope.
//!
//! This crate contains the label table, spectrogram and statistics record
//! types, the collaborator traits and the configuration logic used across
//! the songscope workspace.

pub mod config;
pub mod error;
pub mod labels;
pub mod record;
pub mod spectrogram;
pub mod traits;

pub use config::{AppConfig, FailurePolicy, PreprocessConfig, StatsConfig};
pub use error::CoreError;
pub use labels::{LabelRow, LabelTable};
pub use record::{FileStatsRecord, FileStatsRow, MatchStatsEntry};
pub use spectrogram::{BoundingBox, BoxTable, Spectrogram};
pub use traits::{SpectrogramSource, StatsSink};
