//! Subversion sync of the cached copy

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::deploy::shell::{CommandRunner, ShellCommand};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::release::ReleaseRequest;

/// Subversion options for a sync
#[derive(Debug, Clone, Copy)]
pub struct SvnOptions<'a> {
    pub username: Option<&'a str>,
    pub password: Option<&'a SecretString>,
    pub svn_arguments: &'a str,
    pub svn_info_args: &'a str,
}

fn svn_command(request: &ReleaseRequest, options: &SvnOptions<'_>, extra_args: &str) -> ShellCommand {
    let mut cmd = ShellCommand::new("svn")
        .env("HOME", request.home.to_string_lossy())
        .as_user(request.user.as_str())
        .args(extra_args.split_whitespace());
    if let Some(username) = options.username {
        cmd = cmd.args(["--username", username]);
    }
    if let Some(password) = options.password {
        cmd = cmd.args(["--password", password.expose_secret()]);
    }
    cmd
}

/// Check out or update `cached_copy`, returning the working copy revision
pub async fn sync_working_copy(
    runner: &dyn CommandRunner,
    request: &ReleaseRequest,
    options: SvnOptions<'_>,
    cached_copy: &Dir,
) -> Result<String, DeployError> {
    let target = cached_copy.path();
    info!(
        "Syncing subversion repository {} to {}",
        request.repository,
        target.display()
    );

    let mut sync = if cached_copy.subdir(".svn").exists().await {
        debug!("Updating existing working copy");
        svn_command(request, &options, options.svn_arguments).args(["update", "-q"])
    } else {
        svn_command(request, &options, options.svn_arguments)
            .args(["checkout", "-q", request.repository.as_str()])
    };
    if let Some(revision) = request.revision.as_deref() {
        sync = sync.args(["-r", revision]);
    }
    runner
        .run(&sync.path_arg(target))
        .await
        .map_err(|e| DeployError::CheckoutError(format!("svn sync failed: {e}")))?;

    let info = svn_command(request, &options, options.svn_info_args)
        .args(["info", "--show-item", "revision"])
        .path_arg(target);
    let revision = runner.output(&info).await?;
    info!("Cached copy at revision {}", revision);
    Ok(revision)
}
