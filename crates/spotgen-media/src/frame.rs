//! Last-frame extraction for scene chaining.

use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Extract the final presentable frame of a clip as a PNG.
///
/// Seeks from the end of file so only the tail is decoded; `-update 1`
/// keeps overwriting the single output image until the last decoded frame
/// wins.
pub async fn extract_last_frame(
    clip_path: impl AsRef<Path>,
    output_png: impl AsRef<Path>,
) -> MediaResult<()> {
    let clip_path = clip_path.as_ref();
    let output_png = output_png.as_ref();

    if !clip_path.exists() {
        return Err(MediaError::FileNotFound(clip_path.to_path_buf()));
    }

    let cmd = FfmpegCommand::new(output_png)
        .input_with_args(["-sseof", "-0.5"], clip_path)
        .output_args(["-update", "1", "-q:v", "1"])
        .log_level("error");

    FfmpegRunner::new().with_timeout(60).run(&cmd).await?;

    if !output_png.exists() {
        return Err(MediaError::InvalidMedia(
            "frame extraction produced no output".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_clip_is_reported() {
        let err = extract_last_frame("/nonexistent/clip.mp4", "/tmp/out.png")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
