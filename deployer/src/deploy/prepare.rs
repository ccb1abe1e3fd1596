//! Checkout preparation for each source type

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::deploy::collaborators::{CheckoutContext, CheckoutPreparer};
use crate::deploy::shell::{chown, shell_quote, CommandRunner, ShellCommand};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::descriptor::ScmConfig;

/// File name of the deploy key inside `~/.ssh`
pub const DEPLOY_KEY_NAME: &str = "id_deploy";

const ARCHIVE_COMMIT_MESSAGE: &str = "Create temporary repository from downloaded contents.";

/// Location of the deploy key for a home directory
pub fn deploy_key_path(home: &Path) -> PathBuf {
    home.join(".ssh").join(DEPLOY_KEY_NAME)
}

/// `GIT_SSH_COMMAND` value that authenticates with the deploy key
pub fn git_ssh_command(key: &Path) -> String {
    format!(
        "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=no",
        shell_quote(&key.to_string_lossy())
    )
}

/// Normalize an S3 location to an `s3://bucket/key` URI
pub fn s3_uri(repository: &str) -> Result<String, DeployError> {
    if repository.starts_with("s3://") {
        return Ok(repository.to_string());
    }

    let invalid = || DeployError::ConfigError(format!("not an S3 location: {repository}"));
    let url = Url::parse(repository).map_err(|_| invalid())?;
    let host = url.host_str().ok_or_else(invalid)?;
    if !host.ends_with(".amazonaws.com") {
        return Err(invalid());
    }

    let path = url.path().trim_start_matches('/');
    if host.starts_with("s3.") || host.starts_with("s3-") {
        // path style: https://s3.amazonaws.com/<bucket>/<key>
        if path.is_empty() {
            return Err(invalid());
        }
        Ok(format!("s3://{path}"))
    } else {
        // virtual hosted: https://<bucket>.s3.amazonaws.com/<key>
        let bucket = host
            .split(".s3")
            .next()
            .filter(|b| !b.is_empty() && *b != host)
            .ok_or_else(invalid)?;
        Ok(format!("s3://{bucket}/{path}"))
    }
}

/// Last path segment of a location, used as the downloaded file name
fn archive_name(location: &str) -> String {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("archive")
        .to_string()
}

/// Prepares checkouts on the local host
pub struct SystemCheckoutPreparer {
    runner: Arc<dyn CommandRunner>,
    /// Temp dirs holding downloaded archives and their repositories
    downloads: Mutex<Vec<Dir>>,
}

impl SystemCheckoutPreparer {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            downloads: Mutex::new(Vec::new()),
        }
    }

    async fn download_dir(&self, prefix: &str) -> Result<Dir, DeployError> {
        let workdir = Dir::create_temp_dir(prefix).await?;
        self.downloads.lock().await.push(workdir.clone());
        Ok(workdir)
    }

    /// Download or copy the archive into `workdir`
    async fn fetch_archive(&self, repository: &str, workdir: &Dir) -> Result<File, DeployError> {
        match Url::parse(repository) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let file = workdir.file(&archive_name(url.path()));
                info!("Downloading archive {}", url);
                let bytes = reqwest::get(url)
                    .await?
                    .error_for_status()?
                    .bytes()
                    .await?;
                file.write_bytes(&bytes).await?;
                Ok(file)
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|_| {
                    DeployError::ConfigError(format!("invalid file URL: {repository}"))
                })?;
                self.copy_local(&path, workdir).await
            }
            _ => self.copy_local(Path::new(repository), workdir).await,
        }
    }

    async fn copy_local(&self, path: &Path, workdir: &Dir) -> Result<File, DeployError> {
        let source = File::new(path);
        if !source.exists().await {
            return Err(DeployError::NotFound(format!("archive {}", path.display())));
        }
        let file = workdir.file(&archive_name(&path.to_string_lossy()));
        tokio::fs::copy(path, file.path()).await?;
        Ok(file)
    }

    /// Unpack the archive and turn its contents into a single-commit git repository
    async fn materialize(&self, archive: &File, workdir: &Dir) -> Result<PathBuf, DeployError> {
        let target = workdir.subdir("archive.d");
        target.create().await?;

        let name = archive.path().to_string_lossy().to_lowercase();
        let extract = if name.ends_with(".zip") {
            ShellCommand::new("unzip")
                .arg("-q")
                .path_arg(archive.path())
                .arg("-d")
                .path_arg(target.path())
        } else {
            ShellCommand::new("tar")
                .arg("-xf")
                .path_arg(archive.path())
                .arg("-C")
                .path_arg(target.path())
        };
        self.runner.run(&extract).await?;

        // Archives wrapping everything in one top-level directory use it as the root
        let entries = target.list_dirs().await?;
        let mut listing = tokio::fs::read_dir(target.path()).await?;
        let mut count = 0;
        while listing.next_entry().await?.is_some() {
            count += 1;
        }
        let root = match entries.as_slice() {
            [only] if count == 1 => only.clone(),
            _ => target.path().to_path_buf(),
        };

        let git = |args: &[&str]| {
            ShellCommand::new("git")
                .args(args.iter().copied())
                .current_dir(&root)
        };
        for step in [
            ShellCommand::script(
                "find . -mindepth 1 -name .git -prune -exec rm -rf {} + ; find . -name .gitmodules -type f -delete",
            )
            .current_dir(&root),
            git(&["init", "-q"]),
            git(&["add", "-A"]),
            git(&[
                "-c",
                "user.name=meteor-deploy",
                "-c",
                "user.email=root@localhost",
                "commit",
                "-q",
                "--allow-empty",
                "-m",
                ARCHIVE_COMMIT_MESSAGE,
            ]),
        ] {
            self.runner.run(&step).await?;
        }

        debug!("Materialized archive as git repository at {}", root.display());
        Ok(root)
    }
}

#[async_trait]
impl CheckoutPreparer for SystemCheckoutPreparer {
    async fn prepare_git(
        &self,
        ctx: &CheckoutContext,
        ssh_key: Option<&SecretString>,
    ) -> Result<(), DeployError> {
        let ssh_dir = Dir::new(ctx.home.join(".ssh"));
        ssh_dir.create_with_mode(0o700).await?;

        if let Some(key) = ssh_key {
            let key_file = File::new(deploy_key_path(&ctx.home));
            let mut material = key.expose_secret().to_string();
            if !material.ends_with('\n') {
                material.push('\n');
            }
            key_file.write_atomic(material.as_bytes()).await?;
            key_file.set_mode(0o600).await?;
            debug!("Installed deploy key at {}", key_file.path().display());
        }

        let owner = format!("{}:{}", ctx.user, ctx.group);
        self.runner.run(&chown(&owner, ssh_dir.path(), true)).await
    }

    async fn prepare_svn(
        &self,
        ctx: &CheckoutContext,
        application: &str,
    ) -> Result<(), DeployError> {
        debug!("Preparing subversion checkout of {}", application);
        let config_dir = Dir::new(ctx.home.join(".subversion"));
        config_dir.create_with_mode(0o700).await?;

        let owner = format!("{}:{}", ctx.user, ctx.group);
        self.runner.run(&chown(&owner, config_dir.path(), true)).await
    }

    async fn prepare_archive(&self, scm: &ScmConfig) -> Result<PathBuf, DeployError> {
        let workdir = self.download_dir("meteor-archive").await?;
        let archive = self.fetch_archive(&scm.repository, &workdir).await?;
        self.materialize(&archive, &workdir).await
    }

    async fn prepare_s3(&self, scm: &ScmConfig) -> Result<PathBuf, DeployError> {
        let uri = s3_uri(&scm.repository)?;
        let workdir = self.download_dir("meteor-s3").await?;
        let archive = workdir.file(&archive_name(&uri));

        let mut fetch = ShellCommand::new("aws")
            .args(["s3", "cp", uri.as_str()])
            .path_arg(archive.path());
        if let (Some(key_id), Some(secret)) = (&scm.user, &scm.password) {
            fetch = fetch
                .env("AWS_ACCESS_KEY_ID", key_id.as_str())
                .env("AWS_SECRET_ACCESS_KEY", secret.expose_secret());
        }

        info!("Fetching {}", uri);
        self.runner.run(&fetch).await?;
        self.materialize(&archive, &workdir).await
    }

    async fn discard_downloads(&self) -> Result<(), DeployError> {
        let downloads: Vec<Dir> = self.downloads.lock().await.drain(..).collect();
        for workdir in downloads {
            debug!("Removing {}", workdir.path().display());
            workdir.delete().await?;
        }
        Ok(())
    }
}
