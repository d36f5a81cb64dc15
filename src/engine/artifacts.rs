//! Artifact Store
//!
//! Content-addressed cache for proving artifacts (circuits, zkeys). Only the
//! engine reads and writes it; the core hands a store to the engine at
//! startup and never touches it afterwards.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact path: {0}")]
    InvalidPath(String),
}

/// Storage contract consumed by the engine
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, ArtifactError>;

    /// Missing artifacts are `Ok(None)`, not an error
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArtifactError>;

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactError>;

    /// Removing a missing artifact is a no-op
    async fn remove(&self, key: &str) -> Result<(), ArtifactError>;
}

/// Filesystem-backed store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` under the root, refusing absolute paths and `..`
    fn resolve(&self, key: &str) -> Result<PathBuf, ArtifactError> {
        let rel = Path::new(key);
        let escapes = rel.components().any(|c| {
            !matches!(
                c,
                std::path::Component::Normal(_) | std::path::Component::CurDir
            )
        });
        if key.is_empty() || escapes {
            return Err(ArtifactError::InvalidPath(key.to_string()));
        }
        Ok(self.root.join(rel))
    }

    fn io_err(path: &Path, source: std::io::Error) -> ArtifactError {
        ArtifactError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn exists(&self, key: &str) -> Result<bool, ArtifactError> {
        let path = self.resolve(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Self::io_err(&path, e))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_err(&path, e)),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_err(parent, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Self::io_err(&path, e))?;
        debug!(key, bytes = bytes.len(), "Artifact stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ArtifactError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(&path, e)),
        }
    }
}
