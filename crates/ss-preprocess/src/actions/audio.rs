use anyhow::{Result, ensure};
use rand::Rng;
use rand::rngs::StdRng;
use ss_audio::{Audio, AudioError};

use crate::action::{Action, ActionContext};
use crate::sample::Sample;

/// Path in, [`Audio`] out. Resamples to `sample_rate` when set.
#[derive(Clone, Debug)]
pub struct AudioLoader {
    /// Target rate, or the file's own rate when `None`.
    pub sample_rate: Option<u32>,
}

impl Action for AudioLoader {
    fn name(&self) -> &'static str {
        "load_audio"
    }

    fn apply(&self, sample: Sample, _ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let path = sample.into_path(self.name())?;
        let audio = Audio::from_file(&path, self.sample_rate)?;
        ensure!(
            !audio.samples().is_empty(),
            AudioError::Empty { path: path.display().to_string() }
        );
        Ok(Sample::Audio(audio))
    }
}

/// Cut a random `length`-second window out of `audio`.
///
/// Clips shorter than `length` are looped up to it when `extend` is set,
/// otherwise rejected.
///
/// # Errors
/// Returns `AudioError::TooShort` for a short clip without `extend`.
pub fn random_audio_trim(
    audio: &Audio,
    length: f64,
    extend: bool,
    rng: &mut StdRng,
) -> Result<Audio, AudioError> {
    let duration = audio.duration();
    if duration < length {
        if extend {
            return Ok(audio.extend_to(length));
        }
        return Err(AudioError::TooShort { actual: duration, requested: length });
    }
    let slack = duration - length;
    let start = if slack > 0.0 { rng.gen_range(0.0..slack) } else { 0.0 };
    audio.trim(start, start + length)
}

/// Audio in, audio out: random fixed-length trim, or a no-op without a length.
#[derive(Clone, Debug)]
pub struct AudioTrimmer {
    /// Clip length in seconds.
    pub audio_length: Option<f64>,
    /// Loop clips shorter than `audio_length`.
    pub extend_short_clips: bool,
}

impl Action for AudioTrimmer {
    fn name(&self) -> &'static str {
        "trim_audio"
    }

    fn apply(&self, sample: Sample, ctx: &mut ActionContext<'_>) -> Result<Sample> {
        let audio = sample.into_audio(self.name())?;
        match self.audio_length {
            None => Ok(Sample::Audio(audio)),
            Some(length) => Ok(Sample::Audio(random_audio_trim(
                &audio,
                length,
                self.extend_short_clips,
                ctx.rng,
            )?)),
        }
    }
}
