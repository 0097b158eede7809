use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempDir;

use crate::{error::HdsResult, fragment::FragmentId};

/// Session-scoped directory holding downloaded fragments until they are muxed.
///
/// The directory is removed by [FragmentCache::clear], or when the cache is dropped.
pub struct FragmentCache {
    dir: TempDir,
}

impl FragmentCache {
    pub async fn new_in(parent: impl AsRef<Path>, prefix: &str) -> HdsResult<Self> {
        let parent = parent.as_ref();
        if !parent.exists() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(parent)?;
        Ok(Self { dir })
    }

    pub fn fragment_path(&self, fragment: FragmentId) -> PathBuf {
        self.dir.path().join(fragment.to_string())
    }

    pub async fn write(&self, fragment: FragmentId, data: &[u8]) -> HdsResult<()> {
        tokio::fs::write(self.fragment_path(fragment), data).await?;
        Ok(())
    }

    pub async fn read(&self, fragment: FragmentId) -> HdsResult<Bytes> {
        let data = tokio::fs::read(self.fragment_path(fragment)).await?;
        Ok(Bytes::from(data))
    }

    /// Removes a fragment which is no longer needed.
    pub async fn invalidate(&self, fragment: FragmentId) -> HdsResult<()> {
        let path = self.fragment_path(fragment);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    /// Removes the cache directory and every fragment left in it.
    pub fn clear(self) -> HdsResult<()> {
        self.dir.close()?;
        Ok(())
    }

    pub fn location_hint(&self) -> String {
        self.dir.path().display().to_string()
    }
}
