//! Deposited media lookup and audio extraction.
//!
//! Objects live on a local filesystem mirror of the bucket layout:
//! `<root>/<bucket>/<key>`. Video containers are reduced to an audio track
//! with FFmpeg before they are handed to a provider.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use which::which;

use crate::pipeline::SourceRef;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi", "m4v", "mpeg", "mpg"];

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of a deposited object. Keys may contain `/` but never
    /// escape the bucket directory.
    pub fn resolve(&self, source: &SourceRef) -> Result<PathBuf> {
        if source.bucket.contains('/') {
            bail!("Bucket name may not contain '/': {}", source);
        }
        let bucket = Path::new(&source.bucket);
        let key = Path::new(&source.key);
        for part in [bucket, key] {
            if !part
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            {
                bail!("Refusing object location outside storage root: {}", source);
            }
        }

        let path = self.root.join(bucket).join(key);
        if !path.is_file() {
            bail!("Object not found: {} ({})", source, path.display());
        }
        Ok(path)
    }
}

/// Whether the object needs audio extraction, judged by the content-type
/// hint first and the file extension second.
pub fn is_video(content_type: Option<&str>, path: &Path) -> bool {
    if let Some(content_type) = content_type {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.starts_with("video/") {
            return true;
        }
        if content_type.starts_with("audio/") {
            return false;
        }
    }

    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Audio ready for a provider. Holds the temp directory of an extracted
/// track so it is removed on drop.
#[derive(Debug)]
pub struct PreparedAudio {
    path: PathBuf,
    _workdir: Option<TempDir>,
}

impl PreparedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Return `input` unchanged for audio, or extract its audio track for video.
pub async fn prepare_audio(input: &Path, content_type: Option<&str>) -> Result<PreparedAudio> {
    if !is_video(content_type, input) {
        return Ok(PreparedAudio {
            path: input.to_path_buf(),
            _workdir: None,
        });
    }

    let ffmpeg = which("ffmpeg").context(
        "FFmpeg is required to extract audio from video but was not found on PATH",
    )?;

    let workdir = tempfile::Builder::new()
        .prefix("minutia-audio-")
        .tempdir()
        .context("Failed to create temp directory for audio extraction")?;
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    let output = workdir.path().join(format!("{}.opus", stem));

    info!("Extracting audio from video: {:?}", input);

    // -vn drops video; Opus at 48k keeps speech intelligible and uploads small.
    let result = tokio::process::Command::new(ffmpeg)
        .arg("-i")
        .arg(input)
        .args(["-vn", "-codec:a", "libopus", "-b:a", "48k", "-vbr", "on", "-y"])
        .arg(&output)
        .kill_on_drop(true)
        .output()
        .await
        .context("Failed to run FFmpeg")?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        bail!("FFmpeg audio extraction failed: {}", stderr.trim());
    }
    if !output.exists() {
        bail!("FFmpeg did not produce output file");
    }

    debug!("Extracted audio track to {:?}", output);
    Ok(PreparedAudio {
        path: output,
        _workdir: Some(workdir),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/2026")).unwrap();
        std::fs::write(dir.path().join("b/2026/k1.wav"), b"RIFF").unwrap();

        let store = MediaStore::new(dir.path());
        let path = store.resolve(&SourceRef::new("b", "2026/k1.wav")).unwrap();
        assert!(path.ends_with("b/2026/k1.wav"));
    }

    #[test]
    fn test_resolve_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        assert!(store.resolve(&SourceRef::new("b", "nope.wav")).is_err());
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().join("objects"));
        let err = store
            .resolve(&SourceRef::new("b", "../../etc/passwd"))
            .unwrap_err();
        assert!(err.to_string().contains("outside storage root"));
    }

    #[test]
    fn test_resolve_rejects_slash_in_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let err = store
            .resolve(&SourceRef::new("team/a", "k1.wav"))
            .unwrap_err();
        assert!(err.to_string().contains("may not contain '/'"));
    }

    #[test]
    fn test_is_video() {
        assert!(is_video(Some("video/mp4"), Path::new("x.bin")));
        assert!(!is_video(Some("audio/wav"), Path::new("x.mp4")));
        assert!(is_video(None, Path::new("meeting.MOV")));
        assert!(!is_video(None, Path::new("meeting.wav")));
        assert!(is_video(Some("application/octet-stream"), Path::new("a.mkv")));
    }

    #[tokio::test]
    async fn test_prepare_audio_passes_audio_through() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let prepared = prepare_audio(file.path(), Some("audio/wav")).await.unwrap();
        assert_eq!(prepared.path(), file.path());
    }
}
