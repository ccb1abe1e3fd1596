//! Host services the orchestrator delegates to

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::deploy::helpers::{NpmCli, ScriptCallbackRunner, SharedDirLinker};
use crate::deploy::packages::SystemPackages;
use crate::deploy::prepare::SystemCheckoutPreparer;
use crate::deploy::release::LocalReleaseManager;
use crate::deploy::shell::CommandRunner;
use crate::errors::DeployError;
use crate::models::descriptor::{ScmConfig, ScmType};
use crate::models::release::{Release, ReleaseRequest};
use crate::storage::layout::DeployLayout;

/// Result of making sure SCM client tooling is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Installed,
    AlreadyPresent,
    NotRequired,
}

/// Installs SCM client tooling
#[async_trait]
pub trait ScmPackages: Send + Sync {
    async fn ensure(&self, scm_type: ScmType) -> Result<PackageStatus, DeployError>;
}

/// Deploy user context for a checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutContext {
    pub user: String,
    pub group: String,
    pub home: PathBuf,
}

/// Prepares the host for checking out a given source type
#[async_trait]
pub trait CheckoutPreparer: Send + Sync {
    /// Install SSH key material for authenticated git access
    async fn prepare_git(
        &self,
        ctx: &CheckoutContext,
        ssh_key: Option<&SecretString>,
    ) -> Result<(), DeployError>;

    /// Prepare the subversion configuration directory
    async fn prepare_svn(&self, ctx: &CheckoutContext, application: &str)
        -> Result<(), DeployError>;

    /// Fetch and unpack an archive as a local git repository, returning its path
    async fn prepare_archive(&self, scm: &ScmConfig) -> Result<PathBuf, DeployError>;

    /// Fetch an S3 object as a local git repository, returning its path
    async fn prepare_s3(&self, scm: &ScmConfig) -> Result<PathBuf, DeployError>;

    /// Remove what `prepare_archive` and `prepare_s3` downloaded, once the
    /// release no longer needs the local repository
    async fn discard_downloads(&self) -> Result<(), DeployError> {
        Ok(())
    }
}

/// Callbacks fired by the release manager while a release is created
#[async_trait]
pub trait ReleaseHooks: Send + Sync {
    /// Runs after the release directory is populated, before migration
    async fn before_migrate(&self, release: &Release) -> Result<(), DeployError>;

    /// Runs once `current` points at the release, to restart the application
    async fn before_restart(&self, release: &Release) -> Result<(), DeployError>;
}

/// Creates, activates and rolls back releases
#[async_trait]
pub trait ReleaseManager: Send + Sync {
    async fn create_release(
        &self,
        request: &ReleaseRequest,
        hooks: &dyn ReleaseHooks,
    ) -> Result<Release, DeployError>;
}

/// Installs the application's npm dependencies
#[async_trait]
pub trait NpmInstaller: Send + Sync {
    async fn npm_install(
        &self,
        application: &str,
        release_path: &Path,
        options: &str,
    ) -> Result<(), DeployError>;
}

/// Links staged temp directories into a release
#[async_trait]
pub trait TempFileLinker: Send + Sync {
    async fn link_temp_files(
        &self,
        layout: &DeployLayout,
        release: &Release,
    ) -> Result<(), DeployError>;
}

/// Runs a user-provided callback script
#[async_trait]
pub trait CallbackRunner: Send + Sync {
    /// Run the script at `path` if present, returning whether it ran
    async fn run_if_exists(
        &self,
        path: &Path,
        release: &Release,
        environment: &BTreeMap<String, String>,
    ) -> Result<bool, DeployError>;
}

/// The full set of collaborators used by the orchestrator
#[derive(Clone)]
pub struct Collaborators {
    pub runner: Arc<dyn CommandRunner>,
    pub packages: Arc<dyn ScmPackages>,
    pub preparer: Arc<dyn CheckoutPreparer>,
    pub releases: Arc<dyn ReleaseManager>,
    pub npm: Arc<dyn NpmInstaller>,
    pub temp_files: Arc<dyn TempFileLinker>,
    pub callbacks: Arc<dyn CallbackRunner>,
}

impl Collaborators {
    /// Host implementations, all shelling out through `runner`
    pub fn system(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            packages: Arc::new(SystemPackages::new(runner.clone())),
            preparer: Arc::new(SystemCheckoutPreparer::new(runner.clone())),
            releases: Arc::new(LocalReleaseManager::new(runner.clone())),
            npm: Arc::new(NpmCli::new(runner.clone())),
            temp_files: Arc::new(SharedDirLinker::default()),
            callbacks: Arc::new(ScriptCallbackRunner::new(runner.clone())),
            runner,
        }
    }
}
