use crate::types::{GeneratedArtifact, Result};
use crate::utils::{derive_blob_key, scratch_stem};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Local working directory shared by all item pipelines.
///
/// ```text
/// {root}/documents/   rendered PDFs and style files, one per item
/// {root}/audio/       generator output
/// {root}/transcripts/ transcript_*.txt written by the generator
/// ```
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.root.join("documents")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.root.join("transcripts")
    }

    pub async fn ensure(&self) -> Result<()> {
        for dir in [self.documents_dir(), self.audio_dir(), self.transcripts_dir()] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Start a task for one item. Nothing is written yet.
    pub fn task(&self, item_id: &str) -> GenerationTask {
        let stem = scratch_stem(item_id);
        let documents = self.documents_dir();
        GenerationTask {
            document_path: documents.join(format!("{}.pdf", stem)),
            style_path: documents.join(format!("{}.style.json", stem)),
            scratch_dir: documents,
            work_root: self.root.clone(),
            artifact: None,
        }
    }

    /// Remove leftovers of earlier runs. Returns the number of files removed.
    /// Missing directories are fine.
    pub async fn sweep(&self) -> Result<usize> {
        let mut removed = 0;
        removed += remove_matching(&self.documents_dir(), |_| true).await?;
        removed += remove_matching(&self.audio_dir(), |_| true).await?;
        removed += remove_matching(&self.transcripts_dir(), |name| {
            name.starts_with("transcript_") && name.ends_with(".txt")
        })
        .await?;
        Ok(removed)
    }
}

async fn remove_matching<F>(dir: &Path, selected: F) -> Result<usize>
where
    F: Fn(&str) -> bool,
{
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !selected(name) {
            continue;
        }

        let path = entry.path();
        let result = if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

/// One item's transient pipeline state. Owned by the task processing the
/// item and dropped when it finishes.
#[derive(Debug)]
pub struct GenerationTask {
    pub document_path: PathBuf,
    pub style_path: PathBuf,
    pub scratch_dir: PathBuf,
    work_root: PathBuf,
    artifact: Option<GeneratedArtifact>,
}

impl GenerationTask {
    pub fn record_artifact(&mut self, artifact: GeneratedArtifact) {
        self.artifact = Some(artifact);
    }

    pub fn audio_path(&self) -> Option<&Path> {
        self.artifact.as_ref().map(|a| a.audio_path.as_path())
    }

    pub fn blob_key(&self, prefix: &str) -> Option<String> {
        self.audio_path().map(|path| derive_blob_key(path, &self.work_root, prefix))
    }

    /// Delete every file this task produced. Never fails.
    pub async fn cleanup(&self) {
        let mut paths = vec![self.document_path.clone(), self.style_path.clone()];
        if let Some(artifact) = &self.artifact {
            paths.push(artifact.audio_path.clone());
            paths.extend(artifact.transcript_path.clone());
        }

        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("feedcast-scratch-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn sweep_removes_leftovers_but_keeps_unrelated_transcripts() {
        let work = WorkDir::new(temp_root());
        work.ensure().await.unwrap();
        tokio::fs::write(work.documents_dir().join("old.pdf"), b"x").await.unwrap();
        tokio::fs::write(work.audio_dir().join("old.mp3"), b"x").await.unwrap();
        tokio::fs::write(work.transcripts_dir().join("transcript_1.txt"), b"x").await.unwrap();
        tokio::fs::write(work.transcripts_dir().join("notes.txt"), b"x").await.unwrap();

        assert_eq!(work.sweep().await.unwrap(), 3);
        assert!(work.transcripts_dir().join("notes.txt").exists());
        assert!(!work.audio_dir().join("old.mp3").exists());

        tokio::fs::remove_dir_all(work.root()).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_of_missing_directory_is_a_no_op() {
        let work = WorkDir::new(temp_root());
        assert_eq!(work.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn task_cleanup_only_touches_its_own_files() {
        let work = WorkDir::new(temp_root());
        work.ensure().await.unwrap();
        let mut task = work.task("item/1");
        let other = work.documents_dir().join("other.pdf");
        let audio = work.audio_dir().join("item_1.mp3");

        tokio::fs::write(&task.document_path, b"pdf").await.unwrap();
        tokio::fs::write(&other, b"pdf").await.unwrap();
        tokio::fs::write(&audio, b"mp3").await.unwrap();
        task.record_artifact(GeneratedArtifact { audio_path: audio.clone(), transcript_path: None });

        assert_eq!(task.blob_key("").as_deref(), Some("audio/item_1.mp3"));
        task.cleanup().await;

        assert!(!task.document_path.exists());
        assert!(!audio.exists());
        assert!(other.exists());

        tokio::fs::remove_dir_all(work.root()).await.unwrap();
    }

    #[tokio::test]
    async fn ids_that_sanitize_alike_get_separate_files() {
        let work = WorkDir::new(temp_root());
        work.ensure().await.unwrap();
        let slashed = work.task("a/b");
        let plain = work.task("a_b");

        assert_ne!(slashed.document_path, plain.document_path);
        assert_ne!(slashed.style_path, plain.style_path);
        assert_eq!(plain.document_path, work.documents_dir().join("a_b.pdf"));

        tokio::fs::write(&slashed.document_path, b"pdf").await.unwrap();
        tokio::fs::write(&plain.document_path, b"pdf").await.unwrap();
        slashed.cleanup().await;

        assert!(!slashed.document_path.exists());
        assert!(plain.document_path.exists());

        tokio::fs::remove_dir_all(work.root()).await.unwrap();
    }
}
