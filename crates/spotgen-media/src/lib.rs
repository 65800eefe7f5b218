//! FFmpeg/FFprobe wrappers for the composition pipeline.

pub mod command;
pub mod compose;
pub mod error;
pub mod frame;
pub mod probe;
pub mod workdir;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compose::{
    compose, ComposeInputs, DisclaimerTrack, MUSIC_GAIN, NARRATION_GAIN, PEAK_CEILING,
};
pub use error::{MediaError, MediaResult};
pub use frame::extract_last_frame;
pub use probe::{get_duration, probe_media, MediaInfo};
pub use workdir::Workdir;
