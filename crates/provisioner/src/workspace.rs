//! Local workspace - the folders a join provisions under its root directory

use async_trait::async_trait;
use join_types::{ProvisionError, Workspace};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Name of the lock file that serializes joins against one root
pub const LOCK_FILE: &str = ".join.lock";

/// Workspace rooted at a local directory
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a folder under the root, refusing anything that escapes it
    fn folder(&self, folder: &str) -> Result<PathBuf, ProvisionError> {
        let relative = Path::new(folder);
        let plain = !folder.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !plain {
            return Err(ProvisionError::Workspace(format!(
                "`{}` is not a folder name",
                folder
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn clear(&self, folders: &[String]) -> Result<(), ProvisionError> {
        for folder in folders {
            let path = self.folder(folder)?;
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ProvisionError::Workspace(format!(
                        "failed to clear {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Ok(())
    }

    async fn create(&self, folders: &[String]) -> Result<(), ProvisionError> {
        for folder in folders {
            let path = self.folder(folder)?;
            tokio::fs::create_dir_all(&path).await.map_err(|e| {
                ProvisionError::Workspace(format!("failed to create {}: {}", path.display(), e))
            })?;
        }
        tracing::info!("Workspace ready under {}", self.root.display());
        Ok(())
    }

    async fn write_file(
        &self,
        folder: &str,
        file_name: &str,
        contents: &[u8],
    ) -> Result<PathBuf, ProvisionError> {
        let dir = self.folder(folder)?;
        let path = dir.join(file_name);
        if path.parent() != Some(dir.as_path()) {
            return Err(ProvisionError::Workspace(format!(
                "`{}` is not a file name",
                file_name
            )));
        }

        tokio::fs::write(&path, contents).await.map_err(|e| {
            ProvisionError::Workspace(format!("failed to write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }
}

/// Exclusive claim on a workspace root for the duration of one join
///
/// Released (the lock file removed) on drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
}

impl WorkspaceLock {
    pub async fn acquire(root: &Path) -> Result<Self, ProvisionError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(ProvisionError::workspace)?;

        let path = root.join(LOCK_FILE);
        let result = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        match result {
            Ok(_) => {
                tracing::debug!("Acquired {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ProvisionError::Workspace(
                format!("workspace busy: {} exists", path.display()),
            )),
            Err(e) => Err(ProvisionError::Workspace(format!(
                "failed to lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}
