//! Implémentation des sous-commandes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use rayon::prelude::*;
use ss_audio::splitter::{SplitterDataset, SplitterOptions};
use ss_core::config::SpectrogramParams;
use ss_core::{AppConfig, FailurePolicy, LabelTable, StatsConfig};
use ss_preprocess::{PreprocessOptions, Preprocessor, PreprocessorKind};
use ss_stats::{ComputedSpectrograms, JsonStatsStore, SpectrogramStore, cache_spectrograms};

use crate::cli::{CacheArgs, CorpusArgs, PreprocessArgs, PreprocessorChoice, SplitArgs, StatsArgs};

/// Extensions audio reconnues par le découpage.
const WAV_EXTS: &[&str] = &["wav"];

fn apply_corpus(stats: &mut StatsConfig, corpus: &CorpusArgs) {
    if let Some(dir) = &corpus.data_dir {
        stats.data_dir.clone_from(dir);
    }
    if let Some(dir) = &corpus.store_dir {
        stats.store_dir.clone_from(dir);
    }
    if let Some(n) = corpus.workers {
        stats.num_workers = n;
    }
}

/// `songscope stats`.
///
/// # Errors
/// Returns an error if the run aborts, or if any label failed under the
/// skip policy.
pub fn stats(mut config: AppConfig, args: &StatsArgs) -> Result<()> {
    let stats = &mut config.stats;
    apply_corpus(stats, &args.corpus);
    if args.compute {
        stats.db_rw = false;
    }
    if args.skip_failures {
        stats.failure_policy = FailurePolicy::Skip;
    }
    if let Some(dir) = &args.results_dir {
        stats.results_dir.clone_from(dir);
    }
    config.validate()?;

    let sink = JsonStatsStore::open(&config.stats.results_dir)?;
    let summary = ss_stats::model_fit_algo(&config.stats, &sink)?;
    println!(
        "{} of {} labels written to {}",
        summary.succeeded,
        summary.total,
        config.stats.results_dir.display()
    );
    for failed in &summary.failed {
        eprintln!("failed: {}: {}", failed.label, failed.reason);
    }
    anyhow::ensure!(
        summary.failed.is_empty(),
        "{} labels failed",
        summary.failed.len()
    );
    Ok(())
}

/// `songscope cache`.
///
/// # Errors
/// Returns an error if the label table cannot be read or a spectrogram cannot
/// be computed or stored.
pub fn cache(mut config: AppConfig, args: &CacheArgs) -> Result<()> {
    apply_corpus(&mut config.stats, &args.corpus);
    config.validate()?;
    let stats = &config.stats;

    let table = LabelTable::from_csv(&stats.train_path())?;
    let source = ComputedSpectrograms::new(&stats.data_dir, stats.spectrogram.clone());
    let store = SpectrogramStore::open(&stats.store_dir)?;
    let written = cache_spectrograms(
        table.labels(),
        &source,
        &store,
        stats.resolved_workers(),
        args.overwrite,
    )?;
    println!(
        "{written} spectrograms written to {}",
        stats.store_dir.display()
    );
    Ok(())
}

/// Collecte récursivement les fichiers WAV, triés.
///
/// # Errors
/// Returns an error if a directory cannot be read.
pub fn scan_wavs(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if dir.is_dir() {
        for entry in fs::read_dir(dir).with_context(|| format!("Cannot read {}", dir.display()))? {
            let path = entry?.path();
            if path.is_dir() {
                scan_wavs(&path, files)?;
            } else if path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| WAV_EXTS.contains(&ext.to_lowercase().as_str()))
            {
                files.push(path);
            }
        }
    }
    Ok(())
}

/// `songscope split`.
///
/// # Errors
/// Returns an error if no WAV file is found, the split geometry is invalid,
/// or a clip cannot be written.
pub fn split(args: &SplitArgs) -> Result<()> {
    let mut wavs = Vec::new();
    scan_wavs(&args.input, &mut wavs)?;
    wavs.sort();
    anyhow::ensure!(!wavs.is_empty(), "no WAV files under {}", args.input.display());
    log::info!("Splitting {} recordings", wavs.len());

    let options = SplitterOptions {
        annotations: args.annotations,
        label_corrections: args.label_corrections.clone(),
        overlap: args.overlap,
        duration: args.duration,
        output_directory: args.output.clone(),
        include_last_segment: args.include_last_segment,
        ..SplitterOptions::default()
    };
    let dataset = SplitterDataset::new(wavs, options)?;
    let rows = dataset.split_all()?;

    let mut out: Box<dyn Write> = match &args.rows {
        Some(path) => Box::new(
            fs::File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    for row in &rows {
        writeln!(out, "{row}")?;
    }
    out.flush()?;
    Ok(())
}

fn load_table(path: &Path) -> Result<Arc<LabelTable>> {
    Ok(Arc::new(LabelTable::from_csv(path)?))
}

/// `songscope preprocess`.
///
/// Runs every sample through the pipeline in parallel and prints the class
/// counts and the number of failures.
///
/// # Errors
/// Returns an error if the tables cannot be read, the preprocessor options
/// are invalid, or any sample fails.
pub fn preprocess(config: AppConfig, args: &PreprocessArgs) -> Result<()> {
    config.validate()?;
    let table = load_table(&args.labels)?;
    let overlay_table = args.overlay_labels.as_deref().map(load_table).transpose()?;

    let kind = match args.kind {
        PreprocessorChoice::AudioLoading => PreprocessorKind::AudioLoading,
        PreprocessorChoice::AudioToImage => PreprocessorKind::AudioToImage,
        PreprocessorChoice::ResnetMultilabel => PreprocessorKind::ResnetMultilabel,
    };
    let options = PreprocessOptions {
        audio_length: args.audio_length,
        augmentation: !args.no_augmentation,
        debug: args.debug.clone(),
        overlay_table,
        return_labels: true,
        config: config.preprocess,
        seed: args.seed,
        data_dir: args.data_dir.clone(),
    };
    let pre = Preprocessor::new(kind, table, options)?;
    log::info!("Pipeline: {}", pre.pipeline().names().join(" -> "));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.workers)
        .build()
        .context("Cannot build worker pool")?;
    let done = AtomicUsize::new(0);
    let failures: Vec<String> = pool.install(|| {
        (0..pre.len())
            .into_par_iter()
            .filter_map(|idx| {
                let result = pre.get(idx);
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if n % 100 == 0 {
                    log::info!("Progress: {n}/{}", pre.len());
                }
                result.err().map(|e| e.to_string())
            })
            .collect()
    });

    println!("{} samples, {} failed", pre.len(), failures.len());
    for (class, count) in pre.class_counts() {
        println!("{class}\t{count}");
    }
    for failure in &failures {
        eprintln!("failed: {failure}");
    }
    anyhow::ensure!(failures.is_empty(), "{} samples failed", failures.len());
    Ok(())
}

/// Spectrogram settings shown by `--log-level debug` at startup.
#[must_use]
pub fn describe_spectrogram(params: &SpectrogramParams) -> String {
    format!(
        "sr={} fft={} hop={} threshold={} min_area={}",
        params.sample_rate,
        params.fft_size,
        params.hop_length,
        params.segment_threshold,
        params.min_segment_area
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_finds_nested_wavs_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("one.WAV"), b"").unwrap();
        fs::write(dir.path().join("a/b/two.wav"), b"").unwrap();
        fs::write(dir.path().join("a/notes.txt"), b"").unwrap();

        let mut files = Vec::new();
        scan_wavs(dir.path(), &mut files).unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
        }));
    }

    #[test]
    fn corpus_overrides_replace_config_values() {
        let mut stats = StatsConfig::default();
        apply_corpus(
            &mut stats,
            &CorpusArgs {
                data_dir: Some("corpus".into()),
                store_dir: None,
                workers: Some(4),
            },
        );
        assert_eq!(stats.data_dir, PathBuf::from("corpus"));
        assert_eq!(stats.num_workers, 4);
        assert_eq!(stats.store_dir, StatsConfig::default().store_dir);
    }
}
