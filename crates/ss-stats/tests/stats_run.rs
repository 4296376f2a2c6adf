use std::fs;

use ndarray::Array2;
use ss_audio::Audio;
use ss_core::config::SpectrogramParams;
use ss_core::record::row_len;
use ss_core::{BoundingBox, FailurePolicy, SpectrogramSource, Spectrogram, StatsConfig};
use ss_stats::{
    ComputedSpectrograms, JsonStatsStore, MemorySink, SpectrogramStore, cache_spectrograms,
    model_fit_algo, run_all,
};

fn pattern(h: usize, w: usize, seed: f32) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(y, x)| {
        (((y as f32 + 1.0) * 12.9898 + x as f32 * 78.233 + seed).sin() * 437.585)
            .fract()
            .abs()
    })
}

#[test]
fn five_labels_on_two_workers_persist_five_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = SpectrogramStore::open(dir.path().join("specs")).unwrap();
    let labels: Vec<String> = (0..5).map(|i| format!("rec_{i}.wav")).collect();

    for (i, label) in labels.iter().enumerate() {
        // label i has i boxes
        let boxes: Vec<BoundingBox> = (0..i)
            .map(|b| BoundingBox::new(b * 3, b * 3 + 4, 2 + b, 6 + b).unwrap())
            .collect();
        let spec = Spectrogram::new(pattern(24, 32, i as f32), 2.0 + i as f32).unwrap();
        store.put(label, &boxes, &spec).unwrap();
    }

    let results = JsonStatsStore::open(dir.path().join("results")).unwrap();
    let config = StatsConfig {
        num_frequency_bands: 4,
        template_match_frequency_buffer: 3,
        num_workers: 2,
        failure_policy: FailurePolicy::Abort,
        ..StatsConfig::default()
    };
    let summary = run_all(&labels, &store, &results, &config).unwrap();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.succeeded, 5);

    for (i, label) in labels.iter().enumerate() {
        let record = results.read(label).unwrap();
        assert_eq!(&record.label, label);
        assert_eq!(record.row.len(), row_len(4));
        assert_eq!(record.match_stats.len(), 5);
        for (j, block) in record.match_stats.iter().enumerate() {
            let expected = if i == j { 0 } else { j };
            assert_eq!(block.len(), expected, "{label} block {j}");
        }
        // label 0 has no boxes: zero-filled segment block
        if i == 0 {
            assert!(record.row[record.row.len() - 12..].iter().all(|&v| v == 0.0));
        }
    }
}

#[test]
fn matching_self_scores_one_on_every_box() {
    let dir = tempfile::tempdir().unwrap();
    let store = SpectrogramStore::open(dir.path()).unwrap();
    let boxes = vec![
        BoundingBox::new(1, 6, 3, 7).unwrap(),
        BoundingBox::new(10, 14, 12, 18).unwrap(),
    ];
    store
        .put("solo.wav", &boxes, &Spectrogram::new(pattern(20, 24, 0.5), 1.0).unwrap())
        .unwrap();

    let sink = MemorySink::new();
    let config = StatsConfig {
        num_frequency_bands: 2,
        match_self: true,
        num_workers: 1,
        ..StatsConfig::default()
    };
    run_all(&["solo.wav".to_string()], &store, &sink, &config).unwrap();

    let records = sink.into_records().unwrap();
    let block = &records["solo.wav"].match_stats[0];
    assert_eq!(block.len(), 2);
    for (bbox, entry) in boxes.iter().zip(block) {
        assert!((entry.score - 1.0).abs() < 1e-4);
        assert_eq!((entry.x, entry.y), (bbox.x_min, bbox.y_min));
    }
}

#[test]
fn compute_mode_and_cache_agree() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir_all(&data).unwrap();

    let sr = 8000u32;
    for (name, freq) in [("low.wav", 500.0f32), ("mid.wav", 1500.0), ("high.wav", 3000.0)] {
        // chirp bursts so every file has a few segments
        let samples: Vec<f32> = (0..sr as usize * 2)
            .map(|i| {
                let t = i as f32 / sr as f32;
                let gate = if (t * 4.0).fract() < 0.5 { 1.0 } else { 0.05 };
                gate * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect();
        Audio::new(samples, sr).save(data.join(name)).unwrap();
    }
    fs::write(
        data.join("train.csv"),
        "filename,a,b\nlow.wav,1,0\nmid.wav,0,1\nhigh.wav,1,1\n",
    )
    .unwrap();

    let config = StatsConfig {
        data_dir: data.clone(),
        store_dir: dir.path().join("specs"),
        db_rw: false,
        num_frequency_bands: 8,
        num_workers: 2,
        spectrogram: SpectrogramParams {
            sample_rate: sr,
            fft_size: 256,
            hop_length: 128,
            ..SpectrogramParams::default()
        },
        ..StatsConfig::default()
    };

    let computed_sink = MemorySink::new();
    let summary = model_fit_algo(&config, &computed_sink).unwrap();
    assert_eq!(summary.succeeded, 3);

    let labels: Vec<String> = ["low.wav", "mid.wav", "high.wav"].map(String::from).to_vec();
    let computed = ComputedSpectrograms::new(&data, config.spectrogram.clone());
    let store = SpectrogramStore::open(&config.store_dir).unwrap();
    assert_eq!(cache_spectrograms(&labels, &computed, &store, 2, false).unwrap(), 3);
    assert!(store.load("mid.wav").is_ok());

    let cached_sink = MemorySink::new();
    let cached_config = StatsConfig {
        db_rw: true,
        ..config
    };
    model_fit_algo(&cached_config, &cached_sink).unwrap();

    let a = computed_sink.into_records().unwrap();
    let b = cached_sink.into_records().unwrap();
    assert_eq!(a.len(), 3);
    for label in &labels {
        assert_eq!(a[label].match_stats, b[label].match_stats);
        assert_eq!(a[label].row.len(), row_len(8));
    }
}
