//! Media store collaborator.
//!
//! Attachments live outside the database. The message store only needs two
//! operations: put bytes under a logical folder and get back a reference, and
//! delete a reference again when the surrounding insert fails.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Errors raised by a media store backend
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Unusable media reference: {0}")]
    Unusable(String),
    #[error("Media backend error: {0}")]
    Backend(String),
}

/// External media host (CDN, object storage, local disk)
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store `content` as `file_name` under `folder`, returning the path or
    /// URL later saved on the message.
    async fn store(&self, folder: &str, file_name: &str, content: &[u8])
        -> Result<String, MediaError>;

    /// Remove a previously stored object.
    async fn delete(&self, path: &str) -> Result<(), MediaError>;
}

/// Media store backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
    public_prefix: Option<String>,
}

impl LocalMediaStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, MediaError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            public_prefix: None,
        })
    }

    /// Prefix returned references with a public base URL
    pub fn with_public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefix = Some(prefix.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative(&self, reference: &str) -> String {
        match &self.public_prefix {
            Some(prefix) => reference
                .strip_prefix(prefix.as_str())
                .unwrap_or(reference)
                .trim_start_matches('/')
                .to_string(),
            None => reference.to_string(),
        }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, MediaError> {
        let rel = Path::new(relative);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(MediaError::Unusable(relative.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(
        &self,
        folder: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<String, MediaError> {
        let relative = format!("{}/{}", folder.trim_matches('/'), file_name);
        let path = self.resolve(&relative)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, content).await?;
        debug!("Stored {} bytes at {}", content.len(), path.display());

        Ok(match &self.public_prefix {
            Some(prefix) => format!("{}/{}", prefix, relative),
            None => relative,
        })
    }

    async fn delete(&self, path: &str) -> Result<(), MediaError> {
        let full = self.resolve(&self.relative(path))?;
        fs::remove_file(&full).await?;
        debug!("Deleted media {}", full.display());
        Ok(())
    }
}
