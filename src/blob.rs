//! Local directory blob storage
//!
//! Blobs are addressed by a bare file name under one root directory.
//! Names containing separators or `..` are rejected before touching disk.

use std::path::{Component, Path, PathBuf};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if missing
    pub async fn ensure_root(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `file_name` to a path strictly inside the root
    pub fn resolve(&self, file_name: &str) -> AppResult<PathBuf> {
        let candidate = Path::new(file_name);
        let mut components = candidate.components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if file_name.is_empty() || !single_normal || file_name.contains(['/', '\\']) {
            return Err(AppError::invalid(format!("invalid file name '{}'", file_name)));
        }
        Ok(self.root.join(candidate))
    }

    pub async fn exists(&self, file_name: &str) -> AppResult<bool> {
        let path = self.resolve(file_name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Size in bytes; `NotFound` if the blob is missing
    pub async fn size(&self, file_name: &str) -> AppResult<u64> {
        let path = self.resolve(file_name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(AppError::not_found("file", file_name)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found("file", file_name))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a blob for streaming; `NotFound` if missing
    pub async fn open(&self, file_name: &str) -> AppResult<tokio::fs::File> {
        let path = self.resolve(file_name)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found("file", file_name))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> AppResult<()> {
        let path = self.resolve(file_name)?;
        self.ensure_root().await?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}
