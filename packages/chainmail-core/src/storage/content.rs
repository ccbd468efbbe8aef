//! Filesystem content store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ContentStore, Location};
use crate::digest::Digest;
use crate::error::{Error, Result};

/// Stores each envelope as `<root>/<hex digest>` and hands back a
/// `file://` location for it
#[derive(Debug, Clone)]
pub struct FileContentStore {
    root: PathBuf,
}

impl FileContentStore {
    /// Create a store rooted at `root`; the directory is created on first put
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn put(&self, content_hash: &Digest, contents: &[u8]) -> Result<Location> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            Error::StorageWriteError(format!("create {}: {}", self.root.display(), e))
        })?;

        let path = self.root.join(content_hash.to_hex());
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("Stored {} bytes at {}", contents.len(), path.display());
        Location::parse(&format!("file://{}", path.display()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
