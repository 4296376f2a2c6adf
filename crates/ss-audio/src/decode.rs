use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AudioError;

/// Taux supposé quand le conteneur ne le déclare pas.
const FALLBACK_SAMPLE_RATE: u32 = 22050;

/// Track opened for decoding.
struct OpenTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

fn open_track(path: &Path) -> Result<OpenTrack> {
    let file =
        File::open(path).with_context(|| format!("Cannot open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let format = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Failed to probe audio format of {}", path.display()))?
        .format;

    let track = format
        .default_track()
        .with_context(|| format!("No default audio track in {}", path.display()))?;
    let params = &track.codec_params;
    let decoder = symphonia::default::get_codecs()
        .make(params, &DecoderOptions::default())
        .with_context(|| format!("No decoder for {}", path.display()))?;

    Ok(OpenTrack {
        track_id: track.id,
        sample_rate: params.sample_rate.unwrap_or(FALLBACK_SAMPLE_RATE),
        channels: params.channels.map_or(1, Channels::count).max(1),
        decoder,
        format,
    })
}

/// Decode an audio file into mono f32 samples at its native rate.
///
/// Any format symphonia probes (WAV, FLAC, MP3, OGG) is accepted; channels
/// are averaged.
///
/// # Errors
/// Returns an error if the file cannot be opened or decoded, or decodes to
/// zero samples.
///
/// # Example
/// ```no_run
/// use ss_audio::decode::decode_file;
/// let (samples, sample_rate) = decode_file("recording.wav").unwrap();
/// ```
pub fn decode_file(path: impl AsRef<Path>) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    let mut track = open_track(path)?;
    let mut mono: Vec<f32> = Vec::new();
    let mut buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match track.format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                log::warn!("Packet error in {}: {e}", path.display());
                break;
            }
        };
        if packet.track_id() != track.track_id {
            continue;
        }

        let decoded = match track.decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Frame error in {}: {e}", path.display());
                continue;
            }
        };

        let frames = decoded.capacity();
        // réalloue seulement si le paquet dépasse la capacité courante
        if buf
            .as_ref()
            .is_none_or(|sb| sb.capacity() < frames * track.channels)
        {
            buf = Some(SampleBuffer::<f32>::new(frames as u64, *decoded.spec()));
        }
        let Some(sb) = buf.as_mut() else {
            continue;
        };
        sb.copy_interleaved_ref(decoded);
        mono.extend(
            sb.samples()
                .chunks(track.channels)
                .map(|frame| frame.iter().sum::<f32>() / track.channels as f32),
        );
    }

    if mono.is_empty() {
        return Err(AudioError::Empty {
            path: path.display().to_string(),
        }
        .into());
    }
    log::debug!(
        "Decoded {} samples @ {}Hz from {}",
        mono.len(),
        track.sample_rate,
        path.display()
    );
    Ok((mono, track.sample_rate))
}
