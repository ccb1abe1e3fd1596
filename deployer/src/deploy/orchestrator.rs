//! Deployment orchestrator

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::deploy::build::MeteorBuild;
use crate::deploy::collaborators::{CheckoutContext, Collaborators, ReleaseHooks};
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use crate::deploy::logrotate::{self, LogRotateConfig, LOGROTATE_MODE, LOGROTATE_OWNER};
use crate::deploy::scm::{release_request, resolve_scm, ResolvedScm, ResolvedScmType};
use crate::deploy::shell::{chown, ShellCommand};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::descriptor::{DeploymentDescriptor, ScmConfig, ScmType};
use crate::models::release::Release;
use crate::models::report::DeploymentReport;
use crate::storage::layout::DeployLayout;
use crate::storage::settings::Settings;

/// Mode of the deploy target directory
const DEPLOY_DIR_MODE: u32 = 0o775;

/// Hooks wiring the build and restart into release creation
struct MeteorHooks<'a> {
    build: MeteorBuild<'a>,
    descriptor: &'a DeploymentDescriptor,
    settings: &'a Settings,
    collaborators: &'a Collaborators,
    bootstrap_file: Mutex<Option<PathBuf>>,
}

#[async_trait]
impl ReleaseHooks for MeteorHooks<'_> {
    async fn before_migrate(&self, release: &Release) -> Result<(), DeployError> {
        let written = self.build.run(self.descriptor, release).await?;
        *self.bootstrap_file.lock().await = written;
        Ok(())
    }

    async fn before_restart(&self, release: &Release) -> Result<(), DeployError> {
        let command = self
            .settings
            .restart_command_for(&self.descriptor.application);
        info!("Restarting {} on release {}", self.descriptor.application, release.id);
        self.collaborators
            .runner
            .run(&ShellCommand::script(command))
            .await
    }
}

/// Drives a deployment through its phases
pub struct Orchestrator {
    settings: Settings,
    collaborators: Collaborators,
    fsm: RwLock<DeploymentFsm>,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
            fsm: RwLock::new(DeploymentFsm::new()),
        }
    }

    /// Get the current deployment phase
    pub async fn state(&self) -> DeploymentState {
        self.fsm.read().await.state().clone()
    }

    /// Error message of the last failed run
    pub async fn last_error(&self) -> Option<String> {
        self.fsm.read().await.error().map(str::to_string)
    }

    async fn transition(&self, event: DeploymentEvent) -> Result<(), DeployError> {
        self.fsm
            .write()
            .await
            .process(event)
            .map_err(DeployError::Internal)
    }

    /// Run a deployment. Any phase failure aborts the remaining phases.
    pub async fn deploy(
        &self,
        descriptor: &DeploymentDescriptor,
    ) -> Result<DeploymentReport, DeployError> {
        {
            let mut fsm = self.fsm.write().await;
            if fsm.is_terminal() {
                fsm.process(DeploymentEvent::Reset)
                    .map_err(DeployError::Internal)?;
            }
            fsm.process(DeploymentEvent::Start)
                .map_err(DeployError::Internal)?;
        }

        match self.run(descriptor).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!("Deployment of {} failed: {}", descriptor.application, e);
                let mut fsm = self.fsm.write().await;
                if let Err(transition) = fsm.process(DeploymentEvent::Fail(e.to_string())) {
                    debug!("{}", transition);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        descriptor: &DeploymentDescriptor,
    ) -> Result<DeploymentReport, DeployError> {
        let started_at = Utc::now();
        let kind = descriptor.validate()?;
        info!(
            "Deploying {} ({:?}) to {}",
            descriptor.application,
            descriptor.action,
            descriptor.deploy_to.display()
        );

        self.prepare_environment(descriptor).await?;

        let (resolved, downloaded) = match (descriptor.scm_config(), kind) {
            (Some(config), Some(kind)) => {
                let status = self.collaborators.packages.ensure(kind).await?;
                debug!("SCM tooling for {}: {:?}", kind, status);

                let local = self.prepare_checkout(descriptor, &config, kind).await;
                let resolved = local.and_then(|local| {
                    let resolved = resolve_scm(&config, kind, local.as_deref())?;
                    Ok((Some(resolved), local.is_some()))
                });
                match resolved {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        self.discard_downloads().await;
                        return Err(e);
                    }
                }
            }
            _ => (None, false),
        };

        let released = self.release_phase(descriptor, resolved.as_ref()).await;
        if downloaded {
            self.discard_downloads().await;
        }
        let (release, bootstrap_file) = released?;

        let layout = DeployLayout::new(&descriptor.deploy_to);
        let logrotate_file = self.register_log_rotation(descriptor, &layout).await?;
        self.transition(DeploymentEvent::Complete).await?;
        info!("Deployment of {} completed", descriptor.application);

        Ok(DeploymentReport {
            application: descriptor.application.clone(),
            action: descriptor.action,
            scm_type: kind.map(|k| k.to_string()),
            resolved_scm_type: resolved.map(|scm| scm.scm_type),
            release,
            bootstrap_file,
            logrotate_file,
            state: self.state().await,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Stale-cache cleanup, then release creation unless there is nothing
    /// to check out
    async fn release_phase(
        &self,
        descriptor: &DeploymentDescriptor,
        resolved: Option<&ResolvedScm>,
    ) -> Result<(Option<Release>, Option<PathBuf>), DeployError> {
        let layout = DeployLayout::new(&descriptor.deploy_to);
        if descriptor.delete_cached_copy {
            info!("Deleting cached copy {}", layout.cached_copy_dir().path().display());
            layout.cached_copy_dir().delete().await?;
        }

        match resolved.filter(|scm| scm.scm_type != ResolvedScmType::Other) {
            Some(scm) => {
                self.transition(DeploymentEvent::Release).await?;
                let (release, bootstrap_file) = self.create_release(descriptor, scm).await?;
                self.transition(DeploymentEvent::Released).await?;
                Ok((Some(release), bootstrap_file))
            }
            None => {
                info!("No checkout for {}, skipping release", descriptor.application);
                self.transition(DeploymentEvent::SkipRelease).await?;
                Ok((None, None))
            }
        }
    }

    /// Drop downloaded archives; a failure here does not fail the deployment
    async fn discard_downloads(&self) {
        if let Err(e) = self.collaborators.preparer.discard_downloads().await {
            warn!("Failed to remove downloaded sources: {}", e);
        }
    }

    /// Create the deploy target owned by the deploy user
    async fn prepare_environment(&self, descriptor: &DeploymentDescriptor) -> Result<(), DeployError> {
        let deploy_to = Dir::new(&descriptor.deploy_to);
        deploy_to.create_with_mode(DEPLOY_DIR_MODE).await?;
        let owner = format!("{}:{}", descriptor.user, descriptor.group);
        self.collaborators
            .runner
            .run(&chown(&owner, deploy_to.path(), false))
            .await
    }

    /// Source-type specific preparation, returning the materialized
    /// repository for archive and S3 sources
    async fn prepare_checkout(
        &self,
        descriptor: &DeploymentDescriptor,
        config: &ScmConfig,
        kind: ScmType,
    ) -> Result<Option<PathBuf>, DeployError> {
        let ctx = CheckoutContext {
            user: descriptor.user.clone(),
            group: descriptor.group.clone(),
            home: descriptor.home_dir(),
        };
        let preparer = &self.collaborators.preparer;

        match kind {
            ScmType::Git => {
                preparer.prepare_git(&ctx, config.ssh_key.as_ref()).await?;
                Ok(None)
            }
            ScmType::Svn => {
                preparer.prepare_svn(&ctx, &descriptor.application).await?;
                Ok(None)
            }
            ScmType::Archive => Ok(Some(preparer.prepare_archive(config).await?)),
            ScmType::S3 => Ok(Some(preparer.prepare_s3(config).await?)),
            ScmType::Other => Ok(None),
        }
    }

    async fn create_release(
        &self,
        descriptor: &DeploymentDescriptor,
        scm: &ResolvedScm,
    ) -> Result<(Release, Option<PathBuf>), DeployError> {
        let request = release_request(descriptor, scm)?;
        let hooks = MeteorHooks {
            build: MeteorBuild::new(&self.settings, &self.collaborators),
            descriptor,
            settings: &self.settings,
            collaborators: &self.collaborators,
            bootstrap_file: Mutex::new(None),
        };

        let release = self
            .collaborators
            .releases
            .create_release(&request, &hooks)
            .await?;
        let bootstrap_file = hooks.bootstrap_file.into_inner();
        Ok((release, bootstrap_file))
    }

    async fn register_log_rotation(
        &self,
        descriptor: &DeploymentDescriptor,
        layout: &DeployLayout,
    ) -> Result<PathBuf, DeployError> {
        let file = File::new(logrotate::config_path(
            &self.settings.logrotate_dir,
            &descriptor.application,
        ));
        let config = LogRotateConfig::new([layout.shared_log_dir().path().to_path_buf()]);

        file.write_string(&config.render()).await?;
        file.set_mode(LOGROTATE_MODE).await?;
        self.collaborators
            .runner
            .run(&chown(LOGROTATE_OWNER, file.path(), false))
            .await?;

        info!("Registered log rotation at {}", file.path().display());
        Ok(file.path().to_path_buf())
    }
}
