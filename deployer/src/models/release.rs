//! Release models

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::models::descriptor::DeployAction;

/// Arguments passed to `svn` for both checkout and info operations
pub const SVN_NON_INTERACTIVE_ARGS: &str = "--no-auth-cache --non-interactive --trust-server-cert";

/// A materialized release directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Release identifier (directory name under `releases/`)
    pub id: String,

    /// Absolute path of the release directory
    pub path: PathBuf,

    /// Source revision the release was built from, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl Release {
    /// Release identifier derived from a timestamp
    pub fn id_for(time: DateTime<Utc>) -> String {
        time.format("%Y%m%d%H%M%S").to_string()
    }

    /// Describe an existing release directory
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id,
            path,
            revision: None,
        }
    }

    /// Path of a file or directory inside the release
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }
}

/// SCM-specific options for release creation
#[derive(Debug, Clone)]
pub enum ScmBranch {
    Git {
        enable_submodules: bool,
        shallow_clone: bool,
    },
    Subversion {
        username: Option<String>,
        password: Option<SecretString>,
        svn_arguments: String,
        svn_info_args: String,
    },
}

/// Everything the release manager needs to create or roll back a release
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub application: String,
    pub deploy_to: PathBuf,
    pub keep_releases: usize,
    pub repository: String,
    pub user: String,
    pub group: String,
    /// Home directory handed to SCM tooling as `HOME`
    pub home: PathBuf,
    pub revision: Option<String>,
    pub migrate: bool,
    pub migrate_command: String,
    pub environment: BTreeMap<String, String>,
    pub symlink_before_migrate: BTreeMap<String, String>,
    pub action: DeployAction,
    pub scm: ScmBranch,
}

impl ReleaseRequest {
    /// `user:group` ownership spec
    pub fn owner(&self) -> String {
        format!("{}:{}", self.user, self.group)
    }
}
