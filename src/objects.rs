use crate::errors::StoreError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Blob storage for uploaded files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` and returns the path other rows should reference.
    async fn upload(&self, bucket: &str, name: &str, bytes: &[u8]) -> Result<String, StoreError>;
}

/// Writes each bucket as a directory under `root`.
#[derive(Debug, Clone)]
pub struct DirObjectStore {
    root: PathBuf,
}

impl DirObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for DirObjectStore {
    async fn upload(&self, bucket: &str, name: &str, bytes: &[u8]) -> Result<String, StoreError> {
        if !is_plain_name(bucket) || !is_plain_name(name) {
            return Err(StoreError::Conflict(format!("invalid object name {bucket}/{name}")));
        }

        let dir = self.root.join(bucket);
        fs::create_dir_all(&dir).await?;
        let target = dir.join(name);
        if fs::try_exists(&target).await? {
            return Err(StoreError::Conflict(format!("{bucket}/{name} already exists")));
        }
        fs::write(&target, bytes).await?;

        Ok(format!("{bucket}/{name}"))
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}
