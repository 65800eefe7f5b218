//! Asset key layout and content addressing.
//!
//! All of a job's media lives under `users/{user_id}/jobs/{job_id}/`.
//! File names embed a SHA-256 digest of the content, so writing the same
//! bytes twice lands on the same key and concurrent writers are idempotent.

use sha2::{Digest, Sha256};

/// Characters of the content digest kept in the key.
const DIGEST_PREFIX_LEN: usize = 16;

/// SHA-256 digest of content, truncated for key embedding.
pub fn content_digest(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)[..DIGEST_PREFIX_LEN].to_string()
}

/// Key prefix for everything a job owns.
pub fn job_prefix(user_id: &str, job_id: &str) -> String {
    format!("users/{user_id}/jobs/{job_id}")
}

/// Scene clip: `users/{u}/jobs/{j}/clips/scene-{NNN}-{digest}.mp4`
pub fn clip_key(user_id: &str, job_id: &str, scene_number: u32, data: &[u8]) -> String {
    format!(
        "{}/clips/scene-{:03}-{}.mp4",
        job_prefix(user_id, job_id),
        scene_number,
        content_digest(data)
    )
}

/// Last-frame PNG handed to the next scene's generation:
/// `users/{u}/jobs/{j}/thumbnails/scene-{NNN}-{digest}.png`
pub fn frame_key(user_id: &str, job_id: &str, scene_number: u32, data: &[u8]) -> String {
    format!(
        "{}/thumbnails/scene-{:03}-{}.png",
        job_prefix(user_id, job_id),
        scene_number,
        content_digest(data)
    )
}

/// Music bed: `users/{u}/jobs/{j}/audio/background-music-{digest}.mp3`
pub fn music_key(user_id: &str, job_id: &str, data: &[u8]) -> String {
    format!(
        "{}/audio/background-music-{}.mp3",
        job_prefix(user_id, job_id),
        content_digest(data)
    )
}

/// Narrator voiceover: `users/{u}/jobs/{j}/audio/narrator-voiceover-{digest}.mp3`
pub fn narration_key(user_id: &str, job_id: &str, data: &[u8]) -> String {
    format!(
        "{}/audio/narrator-voiceover-{}.mp3",
        job_prefix(user_id, job_id),
        content_digest(data)
    )
}

/// Disclaimer audio: `users/{u}/jobs/{j}/audio/disclaimer-{digest}.mp3`
pub fn disclaimer_key(user_id: &str, job_id: &str, data: &[u8]) -> String {
    format!(
        "{}/audio/disclaimer-{}.mp3",
        job_prefix(user_id, job_id),
        content_digest(data)
    )
}

/// Final composed video: `users/{u}/jobs/{j}/final/video-{digest}.mp4`
pub fn final_video_key(user_id: &str, job_id: &str, data: &[u8]) -> String {
    format!(
        "{}/final/video-{}.mp4",
        job_prefix(user_id, job_id),
        content_digest(data)
    )
}

/// Content type for a key, by extension.
pub fn content_type_for(key: &str) -> &'static str {
    if key.ends_with(".mp4") {
        "video/mp4"
    } else if key.ends_with(".png") {
        "image/png"
    } else if key.ends_with(".jpg") || key.ends_with(".jpeg") {
        "image/jpeg"
    } else if key.ends_with(".mp3") {
        "audio/mpeg"
    } else if key.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_digest_is_deterministic() {
        let a = content_digest(b"same bytes");
        let b = content_digest(b"same bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), DIGEST_PREFIX_LEN);
        assert_ne!(a, content_digest(b"other bytes"));
    }

    #[test]
    fn test_clip_key_shape() {
        let key = clip_key("user-1", "job-1", 3, b"clip bytes");
        assert!(key.starts_with("users/user-1/jobs/job-1/clips/scene-003-"));
        assert!(key.ends_with(".mp4"));
    }

    #[test]
    fn test_same_content_same_key() {
        let a = final_video_key("u", "j", b"video");
        let b = final_video_key("u", "j", b"video");
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a/b/c.mp4"), "video/mp4");
        assert_eq!(content_type_for("a/b/c.png"), "image/png");
        assert_eq!(content_type_for("a/b/c.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("a/b/c.bin"), "application/octet-stream");
    }
}
