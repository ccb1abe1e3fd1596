//! Deployment report returned by the orchestrator

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentState;
use crate::deploy::scm::ResolvedScmType;
use crate::models::descriptor::DeployAction;
use crate::models::release::Release;

/// Summary of a completed deployment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub application: String,

    pub action: DeployAction,

    /// SCM type as configured, before archive/s3 resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scm_type: Option<String>,

    /// SCM type the checkout step used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_scm_type: Option<ResolvedScmType>,

    /// Release created or activated, absent when checkout was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<Release>,

    /// Generated runtime bootstrap file, absent when the build was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_file: Option<PathBuf>,

    pub logrotate_file: PathBuf,

    pub state: DeploymentState,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}
