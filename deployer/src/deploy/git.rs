//! Git sync of the cached copy

use std::path::Path;

use tracing::{debug, info};

use crate::deploy::prepare::{deploy_key_path, git_ssh_command};
use crate::deploy::shell::{CommandRunner, ShellCommand};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::release::ReleaseRequest;

/// Git options for a sync
#[derive(Debug, Clone, Copy, Default)]
pub struct GitOptions {
    pub enable_submodules: bool,
    pub shallow_clone: bool,
}

/// A git command run as the deploy user with its home as `HOME`
async fn git_command(request: &ReleaseRequest, cwd: Option<&Path>) -> ShellCommand {
    // Materialized archives are owned by root, not the deploy user
    let mut cmd = ShellCommand::new("git")
        .args(["-c", "safe.directory=*"])
        .env("HOME", request.home.to_string_lossy())
        .as_user(request.user.as_str());

    let key = deploy_key_path(&request.home);
    if File::new(&key).exists().await {
        cmd = cmd.env("GIT_SSH_COMMAND", git_ssh_command(&key));
    }
    if let Some(dir) = cwd {
        cmd = cmd.current_dir(dir);
    }
    cmd
}

/// Clone or update `cached_copy` to the requested revision, returning the
/// checked out commit
pub async fn sync_repository(
    runner: &dyn CommandRunner,
    request: &ReleaseRequest,
    options: GitOptions,
    cached_copy: &Dir,
) -> Result<String, DeployError> {
    let target = cached_copy.path();
    let revision = request.revision.as_deref().unwrap_or("HEAD");
    info!(
        "Syncing git repository {} ({}) to {}",
        request.repository,
        revision,
        target.display()
    );

    if !cached_copy.subdir(".git").exists().await {
        debug!("No cached copy, cloning");
        let mut clone = git_command(request, None).await.arg("clone").arg("-q");
        if options.shallow_clone {
            clone = clone.args(["--depth", "1"]);
        }
        runner
            .run(&clone.arg(request.repository.as_str()).path_arg(target))
            .await
            .map_err(|e| DeployError::CheckoutError(format!("git clone failed: {e}")))?;
    } else {
        // Follow repository changes between deploys
        let set_url = git_command(request, Some(target))
            .await
            .args(["remote", "set-url", "origin", request.repository.as_str()]);
        runner.run(&set_url).await?;
    }

    let mut fetch = git_command(request, Some(target)).await.args(["fetch", "-q"]);
    if options.shallow_clone {
        fetch = fetch.args(["--depth", "1"]);
    }
    runner
        .run(&fetch.args(["origin", revision]))
        .await
        .map_err(|e| DeployError::CheckoutError(format!("git fetch of {revision} failed: {e}")))?;

    for args in [
        &["reset", "-q", "--hard", "FETCH_HEAD"][..],
        &["clean", "-q", "-d", "-f"][..],
    ] {
        runner
            .run(&git_command(request, Some(target)).await.args(args.iter().copied()))
            .await?;
    }

    if options.enable_submodules {
        for args in [
            &["submodule", "sync", "--recursive"][..],
            &["submodule", "update", "--init", "--recursive"][..],
        ] {
            runner
                .run(&git_command(request, Some(target)).await.args(args.iter().copied()))
                .await
                .map_err(|e| DeployError::CheckoutError(format!("git submodule failed: {e}")))?;
        }
    }

    let commit = runner
        .output(&git_command(request, Some(target)).await.args(["rev-parse", "HEAD"]))
        .await?;
    info!("Cached copy at commit {}", commit);
    Ok(commit)
}
