//! Release creation, activation and rollback on the local filesystem

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::deploy::collaborators::{ReleaseHooks, ReleaseManager};
use crate::deploy::git::{self, GitOptions};
use crate::deploy::shell::{chown, CommandRunner, ShellCommand};
use crate::deploy::svn::{self, SvnOptions};
use crate::errors::DeployError;
use crate::models::descriptor::DeployAction;
use crate::models::release::{Release, ReleaseRequest, ScmBranch};
use crate::storage::layout::DeployLayout;

/// VCS metadata left out of releases
const VCS_METADATA: &[&str] = &[".git", ".svn"];

/// Point `link` at `target`, replacing any previous link atomically
pub async fn switch_symlink(link: &Path, target: &Path) -> Result<(), DeployError> {
    let staging = link.with_file_name(format!(
        ".{}.{}",
        link.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        uuid::Uuid::new_v4()
    ));
    symlink(target, &staging).await?;
    fs::rename(&staging, link).await?;
    Ok(())
}

#[cfg(unix)]
async fn symlink(target: &Path, link: &Path) -> Result<(), DeployError> {
    fs::symlink(target, link).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn symlink(_target: &Path, link: &Path) -> Result<(), DeployError> {
    Err(DeployError::ReleaseError(format!(
        "symlinks are not supported on this platform: {}",
        link.display()
    )))
}

/// Remove whatever is at `path` (file, symlink or directory)
async fn remove_path(path: &Path) -> Result<(), DeployError> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await?,
        Ok(_) => fs::remove_file(path).await?,
        Err(_) => {}
    }
    Ok(())
}

/// Release `current` points at, if any
pub async fn current_release(layout: &DeployLayout) -> Option<PathBuf> {
    let target = fs::read_link(layout.current_link()).await.ok()?;
    let target = if target.is_relative() {
        layout.deploy_to.join(target)
    } else {
        target
    };
    layout.is_release_path(&target).then_some(target)
}

/// Releases that are candidates for pruning: everything but the newest
/// `keep` entries and the active release
pub fn releases_to_prune(
    releases: &[PathBuf],
    keep: usize,
    current: Option<&Path>,
) -> Vec<PathBuf> {
    let cutoff = releases.len().saturating_sub(keep);
    releases[..cutoff]
        .iter()
        .filter(|path| Some(path.as_path()) != current)
        .cloned()
        .collect()
}

/// Release manager keeping releases under `<deploy_to>/releases`
pub struct LocalReleaseManager {
    runner: Arc<dyn CommandRunner>,
}

impl LocalReleaseManager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn deploy(
        &self,
        request: &ReleaseRequest,
        hooks: &dyn ReleaseHooks,
    ) -> Result<Release, DeployError> {
        let layout = DeployLayout::new(&request.deploy_to);
        let owner = request.owner();
        layout.setup().await?;
        self.runner
            .run(&chown(&owner, layout.shared_dir().path(), true))
            .await?;
        self.runner
            .run(&chown(&owner, layout.releases_dir().path(), false))
            .await?;

        let cached_copy = layout.cached_copy_dir();
        let revision = match &request.scm {
            ScmBranch::Git {
                enable_submodules,
                shallow_clone,
            } => {
                let options = GitOptions {
                    enable_submodules: *enable_submodules,
                    shallow_clone: *shallow_clone,
                };
                git::sync_repository(self.runner.as_ref(), request, options, &cached_copy).await?
            }
            ScmBranch::Subversion {
                username,
                password,
                svn_arguments,
                svn_info_args,
            } => {
                let options = SvnOptions {
                    username: username.as_deref(),
                    password: password.as_ref(),
                    svn_arguments,
                    svn_info_args,
                };
                svn::sync_working_copy(self.runner.as_ref(), request, options, &cached_copy)
                    .await?
            }
        };

        let release = self.allocate_release(&layout, revision).await?;
        info!("Creating release {} at {}", release.id, release.path.display());
        cached_copy
            .copy_contents_to(&layout.release_dir(&release.id), VCS_METADATA)
            .await?;
        self.runner.run(&chown(&owner, &release.path, true)).await?;

        hooks.before_migrate(&release).await?;
        self.link_shared_paths(request, &layout, &release).await?;

        if request.migrate && !request.migrate_command.trim().is_empty() {
            info!("Running migration: {}", request.migrate_command);
            let migrate = ShellCommand::script(request.migrate_command.as_str())
                .current_dir(&release.path)
                .envs(&request.environment)
                .env("HOME", request.home.to_string_lossy())
                .as_user(request.user.as_str());
            self.runner.run(&migrate).await?;
        }

        switch_symlink(&layout.current_link(), &release.path).await?;
        info!("Activated release {}", release.id);

        hooks.before_restart(&release).await?;

        self.prune(&layout, request.keep_releases).await?;
        Ok(release)
    }

    /// Pick a fresh release directory, suffixing the id when two deploys
    /// land in the same second
    async fn allocate_release(
        &self,
        layout: &DeployLayout,
        revision: String,
    ) -> Result<Release, DeployError> {
        let base = Release::id_for(Utc::now());
        let mut id = base.clone();
        let mut attempt = 1;
        while fs::symlink_metadata(layout.release_dir(&id).path()).await.is_ok() {
            id = suffixed_release_id(&base, attempt);
            attempt += 1;
        }

        let dir = layout.release_dir(&id);
        dir.create().await?;
        Ok(Release {
            id,
            path: dir.path().to_path_buf(),
            revision: (!revision.is_empty()).then_some(revision),
        })
    }

    async fn link_shared_paths(
        &self,
        request: &ReleaseRequest,
        layout: &DeployLayout,
        release: &Release,
    ) -> Result<(), DeployError> {
        for (release_path, shared_path) in &request.symlink_before_migrate {
            let link = release.join(release_path);
            let target = layout.shared_dir().path().join(shared_path);
            debug!("Linking {} -> {}", link.display(), target.display());

            remove_path(&link).await?;
            if let Some(parent) = link.parent() {
                fs::create_dir_all(parent).await?;
            }
            symlink(&target, &link).await?;
        }
        Ok(())
    }

    async fn prune(&self, layout: &DeployLayout, keep: usize) -> Result<(), DeployError> {
        let releases = layout.releases_dir().list_dirs().await?;
        let current = current_release(layout).await;

        for path in releases_to_prune(&releases, keep, current.as_deref()) {
            info!("Removing old release {}", path.display());
            fs::remove_dir_all(&path).await?;
        }
        Ok(())
    }

    async fn rollback(
        &self,
        request: &ReleaseRequest,
        hooks: &dyn ReleaseHooks,
    ) -> Result<Release, DeployError> {
        let layout = DeployLayout::new(&request.deploy_to);
        let current = current_release(&layout).await.ok_or_else(|| {
            DeployError::ReleaseError(format!(
                "{} has no active release to roll back",
                request.application
            ))
        })?;

        let releases = layout.releases_dir().list_dirs().await?;
        let previous = releases
            .iter()
            .filter(|path| path.as_path() < current.as_path())
            .last()
            .cloned()
            .ok_or_else(|| {
                DeployError::ReleaseError(format!(
                    "no release before {} to roll back to",
                    current.display()
                ))
            })?;

        let release = Release::from_path(previous);
        switch_symlink(&layout.current_link(), &release.path).await?;
        info!("Rolled back to {}", release.path.display());
        hooks.before_restart(&release).await?;

        if let Err(e) = fs::remove_dir_all(&current).await {
            warn!("Failed to remove rolled back release {}: {}", current.display(), e);
        }
        Ok(release)
    }
}

#[async_trait]
impl ReleaseManager for LocalReleaseManager {
    async fn create_release(
        &self,
        request: &ReleaseRequest,
        hooks: &dyn ReleaseHooks,
    ) -> Result<Release, DeployError> {
        match request.action {
            DeployAction::Deploy => self.deploy(request, hooks).await,
            DeployAction::Rollback => self.rollback(request, hooks).await,
        }
    }
}

/// Release id for the `attempt`-th deploy within the same second.
///
/// The suffix is zero-padded so ids keep sorting chronologically.
fn suffixed_release_id(base: &str, attempt: u32) -> String {
    format!("{base}-{attempt:03}")
}
