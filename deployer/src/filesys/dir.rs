//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DeployError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DeployError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Create the directory (and parents) and set its permission bits
    pub async fn create_with_mode(&self, mode: u32) -> Result<(), DeployError> {
        self.create().await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(mode)).await?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DeployError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Delete the directory if present, then create it empty
    pub async fn reset(&self) -> Result<(), DeployError> {
        self.delete().await?;
        self.create().await
    }

    /// List subdirectories, sorted by name
    pub async fn list_dirs(&self) -> Result<Vec<PathBuf>, DeployError> {
        let mut dirs = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }

        dirs.sort();
        Ok(dirs)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Recursively copy the contents of this directory into `dest`.
    ///
    /// Top-level entries named in `skip` are left out. Symlinks are
    /// recreated as symlinks rather than followed.
    pub async fn copy_contents_to(&self, dest: &Dir, skip: &[&str]) -> Result<(), DeployError> {
        if !self.exists().await {
            return Err(DeployError::NotFound(format!(
                "directory {}",
                self.path.display()
            )));
        }

        let mut pending = vec![(self.path.clone(), dest.path.clone(), true)];

        while let Some((from, to, top_level)) = pending.pop() {
            fs::create_dir_all(&to).await?;
            let mut entries = fs::read_dir(&from).await?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                if top_level && skip.iter().any(|s| name.as_os_str() == std::ffi::OsStr::new(s)) {
                    continue;
                }

                let source = entry.path();
                let target = to.join(&name);
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    pending.push((source, target, false));
                } else if file_type.is_symlink() {
                    copy_symlink(&source, &target).await?;
                } else {
                    fs::copy(&source, &target).await?;
                }
            }
        }

        Ok(())
    }

    /// Create a temporary directory
    pub async fn create_temp_dir(prefix: &str) -> Result<Dir, DeployError> {
        let temp_dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        fs::create_dir_all(&temp_dir).await?;
        Ok(Dir::new(temp_dir))
    }
}

#[cfg(unix)]
async fn copy_symlink(source: &Path, target: &Path) -> Result<(), DeployError> {
    let link = fs::read_link(source).await?;
    if fs::symlink_metadata(target).await.is_ok() {
        fs::remove_file(target).await?;
    }
    fs::symlink(link, target).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn copy_symlink(source: &Path, target: &Path) -> Result<(), DeployError> {
    fs::copy(source, target).await?;
    Ok(())
}
