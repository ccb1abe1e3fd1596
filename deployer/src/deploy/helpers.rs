//! Default npm, temp-file and callback collaborators

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::deploy::collaborators::{CallbackRunner, NpmInstaller, TempFileLinker};
use crate::deploy::release::switch_symlink;
use crate::deploy::shell::{CommandRunner, ShellCommand};
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::release::Release;
use crate::storage::layout::DeployLayout;

/// Runs `npm install` through the command runner
pub struct NpmCli {
    runner: Arc<dyn CommandRunner>,
}

impl NpmCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl NpmInstaller for NpmCli {
    async fn npm_install(
        &self,
        application: &str,
        release_path: &Path,
        options: &str,
    ) -> Result<(), DeployError> {
        info!("Running npm install for {}", application);
        let cmd = ShellCommand::new("npm")
            .arg("install")
            .args(options.split_whitespace())
            .current_dir(release_path);
        self.runner.run(&cmd).await
    }
}

/// Links shared directories into each release
#[derive(Debug, Clone)]
pub struct SharedDirLinker {
    /// Directory names under `shared/` linked as same-named release entries
    pub shared_dirs: Vec<String>,
}

impl Default for SharedDirLinker {
    fn default() -> Self {
        Self {
            shared_dirs: vec!["tmp".to_string(), "log".to_string()],
        }
    }
}

#[async_trait]
impl TempFileLinker for SharedDirLinker {
    async fn link_temp_files(
        &self,
        layout: &DeployLayout,
        release: &Release,
    ) -> Result<(), DeployError> {
        for name in &self.shared_dirs {
            let target = layout.shared_dir().subdir(name);
            target.create().await?;

            let link = release.join(name);
            if fs::symlink_metadata(&link)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)
            {
                fs::remove_dir_all(&link).await?;
            }
            switch_symlink(&link, target.path()).await?;
            debug!("Linked {} -> {}", link.display(), target.path().display());
        }
        Ok(())
    }
}

/// Runs callback scripts with `sh`
pub struct ScriptCallbackRunner {
    runner: Arc<dyn CommandRunner>,
}

impl ScriptCallbackRunner {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl CallbackRunner for ScriptCallbackRunner {
    async fn run_if_exists(
        &self,
        path: &Path,
        release: &Release,
        environment: &BTreeMap<String, String>,
    ) -> Result<bool, DeployError> {
        if !File::new(path).exists().await {
            debug!("No callback at {}", path.display());
            return Ok(false);
        }

        info!("Running callback {}", path.display());
        let cmd = ShellCommand::new("sh")
            .path_arg(path)
            .current_dir(&release.path)
            .envs(environment)
            .env("RELEASE_PATH", release.path.to_string_lossy());
        self.runner.run(&cmd).await?;
        Ok(true)
    }
}
