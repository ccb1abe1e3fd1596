//! Directory layout of a deploy target

use std::path::{Path, PathBuf};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Paths derived from an application's `deploy_to` directory
#[derive(Debug, Clone)]
pub struct DeployLayout {
    /// Deploy target directory
    pub deploy_to: PathBuf,
}

impl DeployLayout {
    /// Create a new layout rooted at `deploy_to`
    pub fn new(deploy_to: impl Into<PathBuf>) -> Self {
        Self {
            deploy_to: deploy_to.into(),
        }
    }

    /// Get the deploy target directory
    pub fn root(&self) -> Dir {
        Dir::new(&self.deploy_to)
    }

    /// Get the shared directory
    pub fn shared_dir(&self) -> Dir {
        Dir::new(self.deploy_to.join("shared"))
    }

    /// Get the persistent SCM working tree
    pub fn cached_copy_dir(&self) -> Dir {
        Dir::new(self.deploy_to.join("shared").join("cached-copy"))
    }

    /// Get the shared config directory
    pub fn shared_config_dir(&self) -> Dir {
        Dir::new(self.deploy_to.join("shared").join("config"))
    }

    /// Get the shared log directory
    pub fn shared_log_dir(&self) -> Dir {
        Dir::new(self.deploy_to.join("shared").join("log"))
    }

    /// Get the shared temp directory
    pub fn shared_tmp_dir(&self) -> Dir {
        Dir::new(self.deploy_to.join("shared").join("tmp"))
    }

    /// Get the TLS private key
    pub fn ssl_key_file(&self) -> File {
        self.shared_config_dir().file("ssl.key")
    }

    /// Get the TLS certificate
    pub fn ssl_cert_file(&self) -> File {
        self.shared_config_dir().file("ssl.crt")
    }

    /// Get the releases directory
    pub fn releases_dir(&self) -> Dir {
        Dir::new(self.deploy_to.join("releases"))
    }

    /// Get a release directory by id
    pub fn release_dir(&self, id: &str) -> Dir {
        self.releases_dir().subdir(id)
    }

    /// Get the path of the `current` symlink
    pub fn current_link(&self) -> PathBuf {
        self.deploy_to.join("current")
    }

    /// Whether `path` lies inside the releases directory
    pub fn is_release_path(&self, path: &Path) -> bool {
        path.parent() == Some(self.releases_dir().path())
    }

    /// Setup the layout (create directories)
    pub async fn setup(&self) -> Result<(), DeployError> {
        self.releases_dir().create().await?;
        self.shared_config_dir().create().await?;
        self.shared_log_dir().create().await?;
        self.shared_tmp_dir().create().await?;
        Ok(())
    }
}
