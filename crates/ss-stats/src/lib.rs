//! Moteur Lasseck2013 : statistiques de premier ordre par fichier,
//! statistiques de second ordre par template matching entre fichiers, et
//! pilote parallèle persistant un enregistrement par label.

pub mod cross_file;
pub mod driver;
pub mod error;
pub mod file_stats;
pub mod source;
pub mod store;
pub mod template;

pub use driver::{FailedLabel, RunSummary, cache_spectrograms, model_fit_algo, run_all, run_stats};
pub use error::StatsError;
pub use source::ComputedSpectrograms;
pub use store::{JsonStatsStore, MemorySink, SpectrogramStore};
