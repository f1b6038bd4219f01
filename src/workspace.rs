use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

/// Scratch directory owned by a single part. Everything inside is removed
/// when the workspace is dropped, so parts never share intermediate files.
#[derive(Debug)]
pub struct PartWorkspace {
    part_number: usize,
    dir: TempDir,
}

impl PartWorkspace {
    pub async fn create(root: &Path, part_number: usize) -> Result<Self> {
        fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create work dir {}", root.display()))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("part_{}_", part_number))
            .tempdir_in(root)
            .with_context(|| format!("Failed to create workspace under {}", root.display()))?;
        Ok(Self { part_number, dir })
    }

    pub fn part_number(&self) -> usize {
        self.part_number
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Audio exactly as returned by the speech service.
    pub fn sentence_audio(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("sentence_{:03}.mp3", index))
    }

    /// Tempo-adjusted, normalised clip that gets measured and merged.
    pub fn sentence_wav(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("sentence_{:03}.wav", index))
    }

    pub fn merged_audio(&self) -> PathBuf {
        self.dir.path().join("output.wav")
    }

    pub fn cue_track(&self) -> PathBuf {
        self.dir.path().join("output.srt")
    }

    pub fn part_script(&self) -> PathBuf {
        self.dir
            .path()
            .join(format!("temp_script_part_{}.json", self.part_number))
    }

    pub fn cover_image(&self) -> PathBuf {
        self.dir.path().join("cover.img")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn workspaces_are_isolated_and_cleaned_up() {
        let root = tempfile::tempdir().unwrap();
        let a = PartWorkspace::create(root.path(), 1).await.unwrap();
        let b = PartWorkspace::create(root.path(), 1).await.unwrap();
        assert_ne!(a.path(), b.path());
        assert_ne!(a.merged_audio(), b.merged_audio());
        assert!(a.path().starts_with(root.path()));

        tokio::fs::write(a.cue_track(), "1\n").await.unwrap();
        let kept = a.path().to_path_buf();
        drop(a);
        assert!(!kept.exists());
        assert!(b.path().exists());
    }

    #[tokio::test]
    async fn file_names_are_ordered_by_index() {
        let root = tempfile::tempdir().unwrap();
        let ws = PartWorkspace::create(root.path(), 3).await.unwrap();
        assert!(ws.sentence_wav(2) < ws.sentence_wav(10));
        assert!(ws.part_script().ends_with("temp_script_part_3.json"));
        assert_eq!(ws.part_number(), 3);
    }
}
