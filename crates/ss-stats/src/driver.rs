//! Pilote parallèle : statistiques de premier et second ordre pour chaque
//! label, puis écriture dans le sink.
//!
//! Les tâches sont indépendantes ; un pool rayon borné les exécute et un
//! thread rapporteur reçoit les complétions par un canal flume.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use ss_core::{
    FailurePolicy, FileStatsRecord, LabelTable, SpectrogramSource, StatsConfig, StatsSink,
};

use crate::cross_file::file_file_stats;
use crate::error::StatsError;
use crate::file_stats::file_stats;
use crate::source::ComputedSpectrograms;
use crate::store::SpectrogramStore;

/// A label whose task failed under [`FailurePolicy::Skip`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedLabel {
    /// Label of the failed task.
    pub label: String,
    /// Rendered error chain.
    pub reason: String,
}

/// Outcome of a full run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Labels scheduled.
    pub total: usize,
    /// Labels whose record reached the sink.
    pub succeeded: usize,
    /// Failures (always empty under [`FailurePolicy::Abort`]).
    pub failed: Vec<FailedLabel>,
}

/// First- and second-order statistics for `labels[position]`, written to
/// `sink`.
///
/// Match blocks follow the order of `labels`. The label's own block is left
/// empty unless `config.match_self` is set.
///
/// # Errors
/// Returns an error naming the label if loading, computing or writing fails.
pub fn run_stats(
    position: usize,
    labels: &[String],
    source: &dyn SpectrogramSource,
    sink: &dyn StatsSink,
    config: &StatsConfig,
) -> Result<()> {
    let label = labels
        .get(position)
        .with_context(|| format!("Label position {position} out of range"))?;

    let stats = file_stats(label, source, config.num_frequency_bands)?;
    let skip = (!config.match_self).then_some(position);
    let match_stats = file_file_stats(
        &stats.spectrogram,
        labels,
        skip,
        source,
        config.template_match_frequency_buffer,
    )
    .with_context(|| format!("Cross-file matching failed for '{label}'"))?;

    sink.write(FileStatsRecord {
        label: label.clone(),
        row: stats.row,
        match_stats,
    })
    .with_context(|| format!("Cannot persist stats for '{label}'"))
}

/// Completion notice sent to the progress reporter.
struct Completed {
    done: usize,
    ok: bool,
}

fn report_progress(rx: &flume::Receiver<Completed>, total: usize, every: usize, start: Instant) {
    let every = every.max(1);
    let mut failures = 0usize;
    while let Ok(msg) = rx.recv() {
        failures += usize::from(!msg.ok);
        if msg.done % every == 0 || msg.done == total {
            let elapsed = start.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                msg.done as f64 / elapsed
            } else {
                0.0
            };
            let eta = if rate > 0.0 {
                (total - msg.done) as f64 / rate
            } else {
                0.0
            };
            log::info!(
                "Progress: {}/{total} ({:.1}%), {failures} failed, {rate:.2} files/s, ETA {eta:.0}s",
                msg.done,
                msg.done as f64 / total as f64 * 100.0,
            );
        }
    }
}

/// Run [`run_stats`] for every label on a bounded worker pool.
///
/// Pool size comes from `config.num_workers` (0 = available parallelism).
/// Records reach the sink in completion order.
///
/// # Errors
/// Under [`FailurePolicy::Abort`], returns [`StatsError::Task`] naming the
/// first failing label; already persisted records stay valid. Returns
/// [`StatsError::Core`] for an invalid configuration before any task runs.
pub fn run_all(
    labels: &[String],
    source: &dyn SpectrogramSource,
    sink: &dyn StatsSink,
    config: &StatsConfig,
) -> Result<RunSummary, StatsError> {
    config.validate()?;

    let total = labels.len();
    let workers = config.resolved_workers();
    log::info!(
        "Stats run: {total} labels, {workers} workers, {} bands, buffer {}, policy {:?}",
        config.num_frequency_bands,
        config.template_match_frequency_buffer,
        config.failure_policy
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("ss-stats-{i}"))
        .build()
        .map_err(|e| StatsError::Pool(e.to_string()))?;

    let start = Instant::now();
    let completed = AtomicUsize::new(0);
    let (tx, rx) = flume::unbounded::<Completed>();

    let outcome = std::thread::scope(|scope| {
        scope.spawn(|| report_progress(&rx, total, config.progress_every, start));

        let tx = tx;
        let run_one = |position: usize| -> Result<(), FailedLabel> {
            let result = run_stats(position, labels, source, sink, config);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = tx.send(Completed {
                done,
                ok: result.is_ok(),
            });
            result.map_err(|e| FailedLabel {
                label: labels[position].clone(),
                reason: format!("{e:#}"),
            })
        };

        let outcome = pool.install(|| match config.failure_policy {
            FailurePolicy::Abort => (0..total)
                .into_par_iter()
                .try_for_each(|position| {
                    run_one(position).inspect_err(|f| {
                        log::error!("Stats failed for '{}': {}", f.label, f.reason);
                    })
                })
                .map(|()| Vec::new()),
            FailurePolicy::Skip => Ok((0..total)
                .into_par_iter()
                .filter_map(|position| {
                    run_one(position)
                        .inspect_err(|f| {
                            log::warn!("Skipping '{}': {}", f.label, f.reason);
                        })
                        .err()
                })
                .collect::<Vec<_>>()),
        });
        // closes the channel so the reporter returns
        drop(tx);
        outcome
    });

    let failed = outcome.map_err(|f| StatsError::Task {
        label: f.label,
        reason: f.reason,
    })?;

    let summary = RunSummary {
        total,
        succeeded: total - failed.len(),
        failed,
    };
    log::info!(
        "Stats run finished in {:.1}s: {} ok, {} failed",
        start.elapsed().as_secs_f64(),
        summary.succeeded,
        summary.failed.len()
    );
    Ok(summary)
}

/// Fit the Lasseck2013 features: read the training table, pick the
/// spectrogram source from `db_rw`, and run every label.
///
/// The configuration is validated before any file is touched.
///
/// # Errors
/// Returns an error if the configuration is invalid, if the label table or
/// store cannot be opened, or as [`run_all`].
pub fn model_fit_algo(config: &StatsConfig, sink: &dyn StatsSink) -> Result<RunSummary> {
    config.validate()?;
    let table = LabelTable::from_csv(&config.train_path())?;
    let labels = table.labels().to_vec();

    let source: Box<dyn SpectrogramSource> = if config.db_rw {
        log::info!("Reading spectrograms from {}", config.store_dir.display());
        Box::new(SpectrogramStore::open(&config.store_dir)?)
    } else {
        log::info!("Computing spectrograms from {}", config.data_dir.display());
        Box::new(ComputedSpectrograms::new(
            &config.data_dir,
            config.spectrogram.clone(),
        ))
    };

    Ok(run_all(&labels, source.as_ref(), sink, config)?)
}

/// Precompute the spectrogram store for every label in parallel.
///
/// Labels already stored are left alone unless `overwrite` is set. Returns
/// the number of entries written.
///
/// # Errors
/// Returns the first generation or write failure, naming the label.
pub fn cache_spectrograms(
    labels: &[String],
    source: &dyn SpectrogramSource,
    store: &SpectrogramStore,
    workers: usize,
    overwrite: bool,
) -> Result<usize> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| StatsError::Pool(e.to_string()))?;
    let written = AtomicUsize::new(0);

    pool.install(|| {
        labels.par_iter().try_for_each(|label| -> Result<()> {
            if !overwrite && store.contains(label) {
                return Ok(());
            }
            let (boxes, spec) = source.load(label)?;
            store.put(label, &boxes, &spec)?;
            let n = written.fetch_add(1, Ordering::Relaxed) + 1;
            if n % 50 == 0 {
                log::info!("Cached {n} spectrograms");
            }
            Ok(())
        })
    })?;

    let written = written.into_inner();
    log::info!("Cached {written} of {} spectrograms", labels.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySink;
    use ndarray::Array2;
    use ss_core::{BoundingBox, BoxTable, CoreError, Spectrogram};

    struct Synthetic;

    impl SpectrogramSource for Synthetic {
        // "short*" labels are two rows tall: too few for four bands
        fn load(&self, label: &str) -> Result<(BoxTable, Spectrogram)> {
            let seed = label.len() as f32;
            let height = if label.starts_with("short") { 2 } else { 16 };
            let data = Array2::from_shape_fn((height, 20), |(y, x)| {
                ((y as f32 * 3.1 + x as f32 * 1.7 + seed).sin() + 1.0) / 2.0
            });
            let boxes = vec![BoundingBox::new(2, 6, 0, height.min(4))?];
            Ok((boxes, Spectrogram::new(data, 3.0)?))
        }
    }

    fn config(policy: FailurePolicy) -> StatsConfig {
        StatsConfig {
            num_frequency_bands: 4,
            template_match_frequency_buffer: 2,
            num_workers: 2,
            failure_policy: policy,
            ..StatsConfig::default()
        }
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn run_stats_fills_every_other_block() {
        let labels = labels(&["a", "bb", "ccc"]);
        let sink = MemorySink::new();
        run_stats(1, &labels, &Synthetic, &sink, &config(FailurePolicy::Abort)).unwrap();

        let records = sink.into_records().unwrap();
        let record = &records["bb"];
        assert_eq!(record.row.len(), ss_core::record::row_len(4));
        assert_eq!(record.match_stats.len(), 3);
        assert_eq!(record.match_stats[0].len(), 1);
        assert!(record.match_stats[1].is_empty());
        assert_eq!(record.match_stats[2].len(), 1);
    }

    #[test]
    fn abort_names_failing_label() {
        let labels = labels(&["short_one"]);
        let sink = MemorySink::new();
        let err = run_all(&labels, &Synthetic, &sink, &config(FailurePolicy::Abort)).unwrap_err();
        match err {
            StatsError::Task { label, reason } => {
                assert_eq!(label, "short_one");
                assert!(reason.contains("bands"), "{reason}");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn skip_reports_failures_and_keeps_going() {
        let labels = labels(&["a", "short_one", "ccc"]);
        let sink = MemorySink::new();
        let summary = run_all(&labels, &Synthetic, &sink, &config(FailurePolicy::Skip)).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].label, "short_one");

        let records = sink.into_records().unwrap();
        assert_eq!(records.len(), 2);
        // the short file is still a valid template source for the others
        assert_eq!(records["a"].match_stats[1].len(), 1);
    }

    #[test]
    fn zero_bands_rejected_before_running() {
        let sink = MemorySink::new();
        let mut cfg = config(FailurePolicy::Abort);
        cfg.num_frequency_bands = 0;
        let err = run_all(&labels(&["a"]), &Synthetic, &sink, &cfg).unwrap_err();
        assert!(matches!(err, StatsError::Core(CoreError::Config(_))));
    }

    #[test]
    fn fit_rejects_config_before_reading_table() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StatsConfig {
            num_frequency_bands: 0,
            data_dir: dir.path().join("absent"),
            ..StatsConfig::default()
        };
        let err = model_fit_algo(&cfg, &MemorySink::new()).unwrap_err();
        assert!(
            matches!(err.downcast_ref::<CoreError>(), Some(CoreError::Config(_))),
            "{err:#}"
        );
    }

    #[test]
    fn cache_writes_once_unless_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpectrogramStore::open(dir.path()).unwrap();
        let labels = labels(&["a", "bb"]);
        assert_eq!(cache_spectrograms(&labels, &Synthetic, &store, 2, false).unwrap(), 2);
        assert_eq!(cache_spectrograms(&labels, &Synthetic, &store, 2, false).unwrap(), 0);
        assert_eq!(cache_spectrograms(&labels, &Synthetic, &store, 2, true).unwrap(), 2);
        assert!(store.contains("bb"));
    }
}
