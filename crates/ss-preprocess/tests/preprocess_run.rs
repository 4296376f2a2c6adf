use std::fs;
use std::path::Path;
use std::sync::Arc;

use ss_audio::Audio;
use ss_core::{LabelTable, PreprocessConfig};
use ss_preprocess::{PreprocessOptions, Preprocessor, Sample};

fn tone(path: &Path, freq: f32, seconds: f32, sr: u32) {
    let n = (seconds * sr as f32) as usize;
    let samples = (0..n)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
        .collect();
    Audio::new(samples, sr).save(path).unwrap();
}

fn corpus(dir: &Path) -> Arc<LabelTable> {
    tone(&dir.join("robin.wav"), 900.0, 1.5, 8000);
    tone(&dir.join("wren.wav"), 2500.0, 1.0, 8000);
    tone(&dir.join("jay.wav"), 1800.0, 2.0, 8000);
    let csv = dir.join("labels.csv");
    fs::write(
        &csv,
        "file,robin,wren,jay\nrobin.wav,1,0,0\nwren.wav,0,1,0\njay.wav,0,0,1\n",
    )
    .unwrap();
    Arc::new(LabelTable::from_csv(&csv).unwrap())
}

fn options(dir: &Path) -> PreprocessOptions {
    PreprocessOptions {
        audio_length: Some(1.0),
        data_dir: Some(dir.to_path_buf()),
        seed: Some(42),
        config: PreprocessConfig {
            width: 64,
            height: 48,
            sample_rate: 8000,
            fft_size: 256,
            hop_length: 64,
            ..PreprocessConfig::default()
        },
        ..PreprocessOptions::default()
    }
}

fn tensor(sample: Sample) -> ss_preprocess::Tensor {
    sample.into_tensor("test").unwrap()
}

#[test]
fn plain_pipeline_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let table = corpus(dir.path());
    let pre = Preprocessor::audio_to_image(
        Arc::clone(&table),
        PreprocessOptions {
            augmentation: false,
            audio_length: None,
            seed: None,
            ..options(dir.path())
        },
    )
    .unwrap();

    let a = pre.get(1).unwrap();
    let b = pre.get(1).unwrap();
    let (ta, tb) = (tensor(a.sample), tensor(b.sample));
    assert_eq!(ta.shape(), (3, 48, 64));
    assert_eq!(ta, tb);
    assert_eq!(a.labels.unwrap().values(), &[0.0, 1.0, 0.0]);
}

#[test]
fn overlay_unions_labels_of_a_different_class() {
    let dir = tempfile::tempdir().unwrap();
    let table = corpus(dir.path());
    let pre = Preprocessor::audio_to_image(table, options(dir.path())).unwrap();

    for idx in 0..pre.len() {
        let item = pre.get(idx).unwrap();
        let labels = item.labels.unwrap();
        // exactly one overlay from another class
        assert_eq!(labels.values()[idx], 1.0);
        assert_eq!(labels.values().iter().sum::<f32>(), 2.0, "sample {idx}");
        assert_eq!(tensor(item.sample).shape(), (3, 48, 64));
    }
}

#[test]
fn seeded_augmentation_reproduces_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let table = corpus(dir.path());
    let debug = dir.path().join("debug");
    let pre = Preprocessor::resnet_multilabel(
        table,
        PreprocessOptions {
            debug: Some(debug.clone()),
            ..options(dir.path())
        },
    )
    .unwrap();

    let serial: Vec<_> = (0..pre.len()).map(|i| pre.get(i).unwrap()).collect();
    let parallel: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..pre.len())
            .map(|i| {
                let pre = &pre;
                s.spawn(move || pre.get(i).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (a, b) in serial.into_iter().zip(parallel) {
        assert_eq!(a.labels, b.labels);
        assert_eq!(tensor(a.sample), tensor(b.sample));
    }
    assert!(fs::read_dir(&debug).unwrap().count() >= 1);
}

#[test]
fn short_clip_without_extension_fails_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let table = corpus(dir.path());
    let pre = Preprocessor::audio_to_image(
        table,
        PreprocessOptions {
            audio_length: Some(1.8),
            augmentation: false,
            ..options(dir.path())
        },
    )
    .unwrap();
    // wren.wav is 1.0 s long
    let err = pre.get(1).unwrap_err().to_string();
    assert!(err.contains("wren.wav") && err.contains("trim_audio"), "{err}");
    assert!(pre.get(2).is_ok());
}
