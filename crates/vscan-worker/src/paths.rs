//! On-disk artifact layout under the work directory.

use std::path::{Path, PathBuf};

use vscan_models::VideoId;

use crate::error::{WorkerError, WorkerResult};

/// `{root}/frames/{id}/`, `{root}/audio/video_{id}_audio.wav` and
/// `{root}/transcripts/video_{id}_transcript.txt`.
///
/// Every path is refused for an id that is not a single safe file-name
/// component, so no id can address anything outside its own artifacts.
#[derive(Debug, Clone)]
pub struct WorkPaths {
    root: PathBuf,
}

impl WorkPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self, id: &VideoId) -> WorkerResult<PathBuf> {
        Ok(self.root.join("frames").join(component(id)?))
    }

    pub fn audio_path(&self, id: &VideoId) -> WorkerResult<PathBuf> {
        Ok(self
            .root
            .join("audio")
            .join(format!("video_{}_audio.wav", component(id)?)))
    }

    pub fn transcript_path(&self, id: &VideoId) -> WorkerResult<PathBuf> {
        Ok(self
            .root
            .join("transcripts")
            .join(format!("video_{}_transcript.txt", component(id)?)))
    }

    /// Remove every artifact of a video. Missing files are ignored.
    pub async fn remove_artifacts(&self, id: &VideoId) -> WorkerResult<()> {
        ignore_missing(tokio::fs::remove_dir_all(self.frames_dir(id)?).await)?;
        ignore_missing(tokio::fs::remove_file(self.audio_path(id)?).await)?;
        ignore_missing(tokio::fs::remove_file(self.transcript_path(id)?).await)?;
        Ok(())
    }
}

fn component(id: &VideoId) -> WorkerResult<&str> {
    if id.is_valid() {
        Ok(id.as_str())
    } else {
        Err(WorkerError::validation(format!(
            "video id {:?} cannot name an artifact path",
            id.as_str()
        )))
    }
}

pub(crate) fn ignore_missing(result: std::io::Result<()>) -> std::io::Result<()> {
    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        let paths = WorkPaths::new("/work");
        let id = VideoId::from("v42");
        assert_eq!(paths.frames_dir(&id).unwrap(), PathBuf::from("/work/frames/v42"));
        assert_eq!(
            paths.audio_path(&id).unwrap(),
            PathBuf::from("/work/audio/video_v42_audio.wav")
        );
        assert_eq!(
            paths.transcript_path(&id).unwrap(),
            PathBuf::from("/work/transcripts/video_v42_transcript.txt")
        );
    }

    #[test]
    fn test_unsafe_ids_have_no_paths() {
        let paths = WorkPaths::new("/work");
        for bad in ["", "..", "../etc", "a/b", "/abs"] {
            let id = VideoId::from(bad);
            assert!(matches!(paths.frames_dir(&id), Err(WorkerError::Validation(_))), "{:?}", bad);
            assert!(paths.audio_path(&id).is_err());
            assert!(paths.transcript_path(&id).is_err());
        }
    }

    #[tokio::test]
    async fn test_remove_artifacts_with_empty_id_keeps_other_videos() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorkPaths::new(dir.path());
        let other = paths.frames_dir(&VideoId::from("other")).unwrap();
        tokio::fs::create_dir_all(&other).await.unwrap();

        assert!(paths.remove_artifacts(&VideoId::from("")).await.is_err());
        assert!(other.exists());
    }

    #[tokio::test]
    async fn test_remove_artifacts_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorkPaths::new(dir.path());
        let id = VideoId::from("v1");
        let frames = paths.frames_dir(&id).unwrap();

        tokio::fs::create_dir_all(&frames).await.unwrap();
        tokio::fs::write(frames.join("frame_000000.jpg"), b"x").await.unwrap();

        paths.remove_artifacts(&id).await.unwrap();
        assert!(!frames.exists());
    }
}
