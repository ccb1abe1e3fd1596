//! SCM config resolution
//!
//! Archive and S3 sources are materialized as local git repositories before
//! checkout. Resolution produces a new config describing what the checkout
//! step actually consumes; the descriptor itself is never rewritten.

use std::fmt;
use std::path::Path;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::models::descriptor::{DeploymentDescriptor, ScmConfig, ScmType};
use crate::models::release::{ReleaseRequest, ScmBranch, SVN_NON_INTERACTIVE_ARGS};

/// SCM type seen by the checkout step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedScmType {
    Git,
    Svn,
    Other,
}

impl fmt::Display for ResolvedScmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolvedScmType::Git => "git",
            ResolvedScmType::Svn => "svn",
            ResolvedScmType::Other => "other",
        })
    }
}

/// SCM config after archive/s3 sources are rerouted to a local repository
#[derive(Debug, Clone)]
pub struct ResolvedScm {
    pub scm_type: ResolvedScmType,
    pub repository: String,
    pub revision: Option<String>,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    /// Type as configured, before resolution
    pub source_type: ScmType,
}

/// Resolve the config the checkout step consumes.
///
/// `local_repository` is the materialized path for archive and S3 sources
/// and is required for them; it is ignored for the other types.
pub fn resolve_scm(
    config: &ScmConfig,
    kind: ScmType,
    local_repository: Option<&Path>,
) -> Result<ResolvedScm, DeployError> {
    let passthrough = |scm_type| ResolvedScm {
        scm_type,
        repository: config.repository.clone(),
        revision: config.revision.clone(),
        user: config.user.clone(),
        password: config.password.clone(),
        source_type: kind,
    };

    match kind {
        ScmType::Git => Ok(passthrough(ResolvedScmType::Git)),
        ScmType::Svn => Ok(passthrough(ResolvedScmType::Svn)),
        ScmType::Other => Ok(passthrough(ResolvedScmType::Other)),
        ScmType::Archive | ScmType::S3 => {
            let path = local_repository.ok_or_else(|| {
                DeployError::CheckoutError(format!(
                    "{kind} source was not materialized before checkout"
                ))
            })?;
            Ok(ResolvedScm {
                scm_type: ResolvedScmType::Git,
                repository: path.to_string_lossy().into_owned(),
                revision: None,
                user: None,
                password: None,
                source_type: kind,
            })
        }
    }
}

/// Build the release manager request for a resolved checkout
pub fn release_request(
    descriptor: &DeploymentDescriptor,
    scm: &ResolvedScm,
) -> Result<ReleaseRequest, DeployError> {
    let branch = match scm.scm_type {
        ResolvedScmType::Git => ScmBranch::Git {
            enable_submodules: descriptor.enable_submodules,
            shallow_clone: descriptor.shallow_clone,
        },
        ResolvedScmType::Svn => ScmBranch::Subversion {
            username: scm.user.clone(),
            password: scm.password.clone(),
            svn_arguments: SVN_NON_INTERACTIVE_ARGS.to_string(),
            svn_info_args: SVN_NON_INTERACTIVE_ARGS.to_string(),
        },
        other => return Err(DeployError::UnsupportedScm(other.to_string())),
    };

    Ok(ReleaseRequest {
        application: descriptor.application.clone(),
        deploy_to: descriptor.deploy_to.clone(),
        keep_releases: descriptor.keep_releases,
        repository: scm.repository.clone(),
        user: descriptor.user.clone(),
        group: descriptor.group.clone(),
        home: descriptor.home_dir(),
        revision: scm.revision.clone(),
        migrate: descriptor.migrate,
        migrate_command: descriptor.migrate_command.clone(),
        environment: descriptor.environment.clone(),
        symlink_before_migrate: descriptor.symlink_before_migrate.clone(),
        action: descriptor.action,
        scm: branch,
    })
}
