//! Audio plumbing for songscope: decoding, clips, STFT magnitude
//! spectrograms, segment detection and recording splitting.

pub mod audio;
pub mod decode;
pub mod error;
pub mod fft;
pub mod segmentation;
pub mod splitter;
pub mod stft;

pub use audio::Audio;
pub use error::AudioError;
