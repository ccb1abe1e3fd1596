//! Meteor build phase, run before migration of each release

use std::path::PathBuf;

use tracing::{debug, info};

use crate::deploy::bootstrap::{root_url, RuntimeBootstrap, TlsProxy, BOOTSTRAP_FILE_NAME};
use crate::deploy::collaborators::Collaborators;
use crate::deploy::patch::NodeVersionPatch;
use crate::deploy::shell::{chown, ShellCommand};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::descriptor::{DeploymentDescriptor, DATABASE_URL_KEY};
use crate::models::release::Release;
use crate::storage::layout::DeployLayout;
use crate::storage::settings::Settings;

/// Archive produced by `meteor bundle`
pub const BUNDLE_ARCHIVE: &str = "bundled_app.tgz";

/// Callback script run at the end of the build, relative to the release
pub const BEFORE_MIGRATE_CALLBACK: &str = "deploy/before_migrate.sh";

/// Bundles the application into a release and writes its bootstrap file
pub struct MeteorBuild<'a> {
    settings: &'a Settings,
    collaborators: &'a Collaborators,
}

impl<'a> MeteorBuild<'a> {
    pub fn new(settings: &'a Settings, collaborators: &'a Collaborators) -> Self {
        Self {
            settings,
            collaborators,
        }
    }

    /// Build into `release`, returning the bootstrap file path, or `None`
    /// when no domain is configured and the build is skipped
    pub async fn run(
        &self,
        descriptor: &DeploymentDescriptor,
        release: &Release,
    ) -> Result<Option<PathBuf>, DeployError> {
        let Some(domain) = descriptor.primary_domain() else {
            debug!("No domain configured for {}, skipping build", descriptor.application);
            return Ok(None);
        };
        let database_url = descriptor.database_url().ok_or_else(|| {
            DeployError::ValidationError(format!("environment is missing {DATABASE_URL_KEY}"))
        })?;

        let runner = self.collaborators.runner.as_ref();
        let layout = DeployLayout::new(&descriptor.deploy_to);
        let web_owner = format!("{}:{}", descriptor.user, self.settings.web_group);
        let url = root_url(domain, descriptor.ssl_support);
        info!("Building {} for {}", descriptor.application, url);

        let scratch = Dir::new(&self.settings.scratch_dir);
        scratch.reset().await?;
        layout.cached_copy_dir().copy_contents_to(&scratch, &[]).await?;

        for step in [
            ShellCommand::new("mrt").arg("install"),
            ShellCommand::new("meteor").args(["bundle", BUNDLE_ARCHIVE]),
            ShellCommand::new("tar").args(["-xzf", BUNDLE_ARCHIVE]),
        ] {
            runner.run(&step.current_dir(scratch.path())).await?;
        }

        let extracted = scratch.subdir("bundle");
        if !extracted.exists().await {
            return Err(DeployError::BuildError(format!(
                "{BUNDLE_ARCHIVE} did not contain a bundle directory"
            )));
        }
        let bundle = Dir::new(release.join("bundle"));
        extracted.copy_contents_to(&bundle, &[]).await?;
        runner.run(&chown(&web_owner, bundle.path(), true)).await?;

        runner
            .run(
                &ShellCommand::new("npm")
                    .args(["install", "http-proxy"])
                    .current_dir(&release.path),
            )
            .await?;

        let bootstrap = RuntimeBootstrap::new(url, database_url)
            .with_port(self.settings.http_port)
            .with_proxy(TlsProxy::new(
                layout.ssl_key_file().path(),
                layout.ssl_cert_file().path(),
                self.settings.https_port,
                self.settings.http_port,
            ));
        let server_js = File::new(release.join(BOOTSTRAP_FILE_NAME));
        server_js.write_string(&bootstrap.render()).await?;
        runner.run(&chown(&web_owner, server_js.path(), false)).await?;

        scratch.delete().await?;

        NodeVersionPatch::new(&self.settings.node_version_floor)?
            .apply_to_release(release)
            .await?;

        self.collaborators
            .temp_files
            .link_temp_files(&layout, release)
            .await?;

        if descriptor.auto_npm_install_on_deploy {
            self.collaborators
                .npm
                .npm_install(
                    &descriptor.application,
                    &release.path,
                    &self.settings.npm_install_options,
                )
                .await?;
        }

        self.collaborators
            .callbacks
            .run_if_exists(
                &release.join(BEFORE_MIGRATE_CALLBACK),
                release,
                &descriptor.environment,
            )
            .await?;

        info!("Wrote bootstrap file {}", server_js.path().display());
        Ok(Some(server_js.path().to_path_buf()))
    }
}
