//! Object key layout for job assets.

use promoreel_models::AspectRatio;

use crate::error::{StorageError, StorageResult};

/// `videos/{owner}/{job}/{16x9}.mp4`
pub fn video_key(owner_id: &str, job_id: &str, aspect_ratio: AspectRatio) -> String {
    format!(
        "videos/{}/{}/{}.mp4",
        owner_id,
        job_id,
        aspect_ratio.as_filename_part()
    )
}

/// `voiceovers/{owner}/{job}.mp3`
pub fn voiceover_key(owner_id: &str, job_id: &str) -> String {
    format!("voiceovers/{}/{}.mp3", owner_id, job_id)
}

/// `thumbnails/{owner}/{job}.jpg`
pub fn thumbnail_key(owner_id: &str, job_id: &str) -> String {
    format!("thumbnails/{}/{}.jpg", owner_id, job_id)
}

/// Fresh key for a user upload, keeping its extension.
pub fn upload_key(filename: &str) -> String {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("uploads/{}{}", uuid::Uuid::new_v4(), ext)
}

/// Reject keys that could escape a storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
