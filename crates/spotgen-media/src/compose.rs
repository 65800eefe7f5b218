//! Deterministic final composition.
//!
//! Concatenates scene clips, trims to the requested duration, mutes any
//! audio embedded in the clips, and mixes the generated audio tracks:
//! music under everything, narration from t=0, disclaimer delayed to its
//! scheduled start. The mix is peak-limited below -0.1 dBFS. Metadata is
//! stripped and muxing is bitexact, so identical inputs produce identical
//! bytes.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Music bed gain relative to unity.
pub const MUSIC_GAIN: f64 = 0.30;

/// Narration gain relative to unity.
pub const NARRATION_GAIN: f64 = 1.0;

/// Linear peak ceiling: -0.1 dBFS.
pub const PEAK_CEILING: f64 = 0.9886;

/// Disclaimer audio and where it starts in the mix.
#[derive(Debug, Clone)]
pub struct DisclaimerTrack {
    pub path: PathBuf,
    pub start_secs: f64,
}

/// Everything the compositor needs.
#[derive(Debug, Clone)]
pub struct ComposeInputs {
    /// Scene clips in order
    pub clip_paths: Vec<PathBuf>,
    /// Final output duration; concatenated clips are trimmed to this
    pub duration_secs: u32,
    pub music_path: Option<PathBuf>,
    pub narration_path: Option<PathBuf>,
    pub disclaimer: Option<DisclaimerTrack>,
}

/// Compose the final video into `output`.
pub async fn compose(
    workdir: &Path,
    inputs: &ComposeInputs,
    output: &Path,
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: u64,
) -> MediaResult<()> {
    if inputs.clip_paths.is_empty() {
        return Err(MediaError::InvalidMedia("no clips to compose".to_string()));
    }
    for clip in &inputs.clip_paths {
        if !clip.exists() {
            return Err(MediaError::FileNotFound(clip.clone()));
        }
    }

    // Pass 1: lossless concat of the scene clips.
    let list_path = workdir.join("concat-list.txt");
    tokio::fs::write(&list_path, concat_list(&inputs.clip_paths)).await?;

    let concat_path = workdir.join("concat.mp4");
    let concat_cmd = FfmpegCommand::new(&concat_path)
        .input_with_args(["-f", "concat", "-safe", "0"], &list_path)
        .output_args(["-c", "copy", "-an"])
        .bitexact()
        .log_level("error");

    let mut runner = FfmpegRunner::new().with_timeout(timeout_secs);
    if let Some(rx) = &cancel_rx {
        runner = runner.with_cancel(rx.clone());
    }
    runner.run(&concat_cmd).await?;

    // Pass 2: trim + audio mix + deterministic encode.
    let mut cmd = FfmpegCommand::new(output).input(&concat_path);

    let mut audio_inputs = Vec::new();
    if let Some(music) = &inputs.music_path {
        cmd = cmd.input(music);
        audio_inputs.push(AudioTrack::Music);
    }
    if let Some(narration) = &inputs.narration_path {
        cmd = cmd.input(narration);
        audio_inputs.push(AudioTrack::Narration);
    }
    if let Some(disclaimer) = &inputs.disclaimer {
        cmd = cmd.input(&disclaimer.path);
        audio_inputs.push(AudioTrack::Disclaimer {
            start_secs: disclaimer.start_secs,
        });
    }

    cmd = cmd
        .output_args(["-map", "0:v"])
        .duration(inputs.duration_secs as f64)
        .video_codec("libx264")
        .output_args(["-preset", "medium", "-crf", "18", "-pix_fmt", "yuv420p"]);

    match build_audio_filter(&audio_inputs) {
        Some(filter) => {
            cmd = cmd
                .filter_complex(filter)
                .output_args(["-map", "[aout]"])
                .audio_codec("aac")
                .output_args(["-b:a", "192k", "-ar", "44100"]);
        }
        None => {
            cmd = cmd.output_arg("-an");
        }
    }
    cmd = cmd.bitexact().log_level("error");

    let mut runner = FfmpegRunner::new().with_timeout(timeout_secs);
    if let Some(rx) = &cancel_rx {
        runner = runner.with_cancel(rx.clone());
    }
    runner.run(&cmd).await?;

    info!(
        clips = inputs.clip_paths.len(),
        duration = inputs.duration_secs,
        "Composed final video"
    );
    Ok(())
}

/// One generated audio track, in ffmpeg input order after the video.
#[derive(Debug, Clone, PartialEq)]
enum AudioTrack {
    Music,
    Narration,
    Disclaimer { start_secs: f64 },
}

/// Build the `-filter_complex` graph for the present audio tracks.
///
/// Input index 0 is the concatenated video; audio tracks follow in the
/// order they were added. Returns `None` when there is no audio at all
/// (the output then carries no audio stream).
fn build_audio_filter(tracks: &[AudioTrack]) -> Option<String> {
    if tracks.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    let mut labels = Vec::new();

    for (i, track) in tracks.iter().enumerate() {
        let input_index = i + 1;
        match track {
            AudioTrack::Music => {
                segments.push(format!("[{input_index}:a]volume={MUSIC_GAIN:.2}[mus]"));
                labels.push("[mus]");
            }
            AudioTrack::Narration => {
                segments.push(format!("[{input_index}:a]volume={NARRATION_GAIN:.2}[nar]"));
                labels.push("[nar]");
            }
            AudioTrack::Disclaimer { start_secs } => {
                let delay_ms = (start_secs.max(0.0) * 1000.0).round() as u64;
                segments.push(format!(
                    "[{input_index}:a]adelay={delay_ms}|{delay_ms}[dis]"
                ));
                labels.push("[dis]");
            }
        }
    }

    let mix_label = if labels.len() == 1 {
        labels[0].to_string()
    } else {
        segments.push(format!(
            "{}amix=inputs={}:duration=longest:normalize=0[mix]",
            labels.join(""),
            labels.len()
        ));
        "[mix]".to_string()
    };

    segments.push(format!("{mix_label}alimiter=limit={PEAK_CEILING}[aout]"));
    Some(segments.join(";"))
}

/// Concat demuxer list file content. Single quotes in paths are escaped
/// per the demuxer's quoting rules.
fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', "'\\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_format() {
        let list = concat_list(&[PathBuf::from("/w/scene-001.mp4"), PathBuf::from("/w/scene-002.mp4")]);
        assert_eq!(list, "file '/w/scene-001.mp4'\nfile '/w/scene-002.mp4'\n");
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/w/o'brien.mp4")]);
        assert!(list.contains("o'\\''brien"));
    }

    #[test]
    fn test_no_audio_tracks_means_no_filter() {
        assert_eq!(build_audio_filter(&[]), None);
    }

    #[test]
    fn test_music_only_graph() {
        let filter = build_audio_filter(&[AudioTrack::Music]).unwrap();
        assert!(filter.contains("[1:a]volume=0.30[mus]"));
        // single track feeds the limiter directly, no amix
        assert!(!filter.contains("amix"));
        assert!(filter.contains("[mus]alimiter=limit=0.9886[aout]"));
    }

    #[test]
    fn test_full_pharma_graph() {
        let filter = build_audio_filter(&[
            AudioTrack::Music,
            AudioTrack::Narration,
            AudioTrack::Disclaimer { start_secs: 22.5 },
        ])
        .unwrap();
        assert!(filter.contains("[1:a]volume=0.30[mus]"));
        assert!(filter.contains("[2:a]volume=1.00[nar]"));
        assert!(filter.contains("[3:a]adelay=22500|22500[dis]"));
        assert!(filter.contains("[mus][nar][dis]amix=inputs=3:duration=longest:normalize=0[mix]"));
        assert!(filter.contains("[mix]alimiter=limit=0.9886[aout]"));
    }

    #[test]
    fn test_disclaimer_delay_rounds_to_ms() {
        let filter =
            build_audio_filter(&[AudioTrack::Disclaimer { start_secs: 21.0004 }]).unwrap();
        assert!(filter.contains("adelay=21000|21000"));
    }

    #[tokio::test]
    async fn test_compose_rejects_empty_clip_list() {
        let workdir = tempfile::tempdir().unwrap();
        let inputs = ComposeInputs {
            clip_paths: vec![],
            duration_secs: 30,
            music_path: None,
            narration_path: None,
            disclaimer: None,
        };
        let err = compose(
            workdir.path(),
            &inputs,
            &workdir.path().join("out.mp4"),
            None,
            60,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::InvalidMedia(_)));
    }
}
