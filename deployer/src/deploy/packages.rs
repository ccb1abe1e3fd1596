//! SCM client package assurance

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::deploy::collaborators::{PackageStatus, ScmPackages};
use crate::deploy::shell::{has_program, CommandRunner, ShellCommand};
use crate::errors::DeployError;
use crate::models::descriptor::ScmType;

/// Binary and package providing the client for a source type.
///
/// Archive and S3 sources are checked out as local git repositories, so
/// they need git as well.
pub fn scm_package(scm_type: ScmType) -> Option<(&'static str, &'static str)> {
    match scm_type {
        ScmType::Git | ScmType::Archive | ScmType::S3 => Some(("git", "git")),
        ScmType::Svn => Some(("svn", "subversion")),
        ScmType::Other => None,
    }
}

/// Installs packages through the host package manager
pub struct SystemPackages {
    runner: Arc<dyn CommandRunner>,
}

impl SystemPackages {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn install(&self, package: &str) -> Result<(), DeployError> {
        let runner = self.runner.as_ref();
        let command = if has_program(runner, "apt-get").await {
            ShellCommand::new("apt-get")
                .args(["install", "-y", package])
                .env("DEBIAN_FRONTEND", "noninteractive")
        } else if has_program(runner, "dnf").await {
            ShellCommand::new("dnf").args(["install", "-y", package])
        } else if has_program(runner, "yum").await {
            ShellCommand::new("yum").args(["install", "-y", package])
        } else {
            return Err(DeployError::ConfigError(format!(
                "no supported package manager found to install {package}"
            )));
        };

        runner.run(&command).await
    }
}

#[async_trait]
impl ScmPackages for SystemPackages {
    async fn ensure(&self, scm_type: ScmType) -> Result<PackageStatus, DeployError> {
        let Some((binary, package)) = scm_package(scm_type) else {
            return Ok(PackageStatus::NotRequired);
        };

        if has_program(self.runner.as_ref(), binary).await {
            debug!("{} already installed", binary);
            return Ok(PackageStatus::AlreadyPresent);
        }

        info!("Installing package {} for {} checkouts", package, scm_type);
        self.install(package).await?;
        Ok(PackageStatus::Installed)
    }
}
