//! Deployment descriptor models

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::DeployError;

/// Environment key holding the database connection string
pub const DATABASE_URL_KEY: &str = "MONGO_URL";

/// Source control type as written in the descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScmType {
    Git,
    Svn,
    Archive,
    S3,
    Other,
}

impl ScmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScmType::Git => "git",
            ScmType::Svn => "svn",
            ScmType::Archive => "archive",
            ScmType::S3 => "s3",
            ScmType::Other => "other",
        }
    }
}

impl FromStr for ScmType {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(ScmType::Git),
            "svn" => Ok(ScmType::Svn),
            "archive" => Ok(ScmType::Archive),
            "s3" => Ok(ScmType::S3),
            "other" => Ok(ScmType::Other),
            _ => Err(DeployError::UnsupportedScm(s.to_string())),
        }
    }
}

impl fmt::Display for ScmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployAction {
    #[default]
    Deploy,
    Rollback,
}

impl FromStr for DeployAction {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deploy" => Ok(DeployAction::Deploy),
            "rollback" => Ok(DeployAction::Rollback),
            _ => Err(DeployError::ValidationError(format!(
                "unknown deploy action: {s}"
            ))),
        }
    }
}

/// Source control configuration.
///
/// `scm_type` is kept as written so that an unknown value can be reported
/// verbatim by [`ScmConfig::kind`].
#[derive(Debug, Clone, Deserialize)]
pub struct ScmConfig {
    pub scm_type: String,

    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub revision: Option<String>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub ssh_key: Option<SecretString>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
}

/// Prefix of the environment entries that carry an SCM config
const SCM_ENV_PREFIX: &str = "scm__";

impl ScmConfig {
    /// Parse the configured SCM type
    pub fn kind(&self) -> Result<ScmType, DeployError> {
        self.scm_type.parse()
    }

    /// Read an SCM config from `scm__*` environment entries.
    ///
    /// Returns `None` when no `scm__*` entry is present. Empty values are
    /// treated as absent, except for the type: a blank `scm__scm_type`
    /// stays empty and is rejected when parsed.
    pub fn from_environment(environment: &BTreeMap<String, String>) -> Option<Self> {
        if !environment.keys().any(|k| k.starts_with(SCM_ENV_PREFIX)) {
            return None;
        }

        let get = |key: &str| {
            environment
                .get(&format!("{SCM_ENV_PREFIX}{key}"))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            scm_type: get("scm_type").unwrap_or_default(),
            repository: get("repository").unwrap_or_default(),
            revision: get("revision"),
            ssh_key: get("ssh_key").map(SecretString::from),
            user: get("user"),
            password: get("password").map(SecretString::from),
        })
    }
}

/// The single input of a deployment run
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentDescriptor {
    /// Application identifier
    pub application: String,

    /// Deploy target directory
    pub deploy_to: PathBuf,

    /// Owning user
    #[serde(default = "default_user")]
    pub user: String,

    /// Owning group
    #[serde(default = "default_group")]
    pub group: String,

    /// Home directory of the deploy user
    #[serde(default)]
    pub home: Option<PathBuf>,

    /// Source control configuration
    #[serde(default)]
    pub scm: Option<ScmConfig>,

    /// Number of releases to retain
    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,

    /// Configured domains, first one is used for the root URL
    #[serde(default)]
    pub domains: Vec<String>,

    /// Whether the application is served over TLS
    #[serde(default)]
    pub ssl_support: bool,

    /// Environment variables passed to the release
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub migrate: bool,

    #[serde(default)]
    pub migrate_command: String,

    #[serde(default = "default_true")]
    pub enable_submodules: bool,

    #[serde(default)]
    pub shallow_clone: bool,

    #[serde(default)]
    pub delete_cached_copy: bool,

    #[serde(default)]
    pub auto_npm_install_on_deploy: bool,

    /// Release-relative path -> shared-relative path, linked before migration
    #[serde(default)]
    pub symlink_before_migrate: BTreeMap<String, String>,

    #[serde(default)]
    pub action: DeployAction,
}

fn default_user() -> String {
    "deploy".to_string()
}

fn default_group() -> String {
    "www-data".to_string()
}

fn default_keep_releases() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()).map(SecretString::from))
}

impl DeploymentDescriptor {
    /// Home directory of the deploy user
    pub fn home_dir(&self) -> PathBuf {
        self.home
            .clone()
            .unwrap_or_else(|| PathBuf::from("/home").join(&self.user))
    }

    /// Effective SCM config: the explicit `scm` block, or `scm__*` environment entries
    pub fn scm_config(&self) -> Option<ScmConfig> {
        self.scm
            .clone()
            .or_else(|| ScmConfig::from_environment(&self.environment))
    }

    /// Database connection string from the environment
    pub fn database_url(&self) -> Option<&str> {
        self.environment.get(DATABASE_URL_KEY).map(String::as_str)
    }

    /// First configured domain, if any
    pub fn primary_domain(&self) -> Option<&str> {
        self.domains.first().map(String::as_str)
    }

    /// Validate the descriptor before anything touches the host.
    ///
    /// Returns the parsed SCM type, or `None` when no SCM is configured.
    pub fn validate(&self) -> Result<Option<ScmType>, DeployError> {
        if self.application.is_empty() || !self.application.chars().all(is_name_char) {
            return Err(DeployError::ValidationError(format!(
                "invalid application name {:?}",
                self.application
            )));
        }

        if !self.deploy_to.is_absolute() {
            return Err(DeployError::ValidationError(format!(
                "deploy_to must be an absolute path: {}",
                self.deploy_to.display()
            )));
        }

        for name in [&self.user, &self.group] {
            if name.is_empty() || !name.chars().all(is_name_char) {
                return Err(DeployError::ValidationError(format!(
                    "invalid user or group name {name:?}"
                )));
            }
        }

        if self.keep_releases == 0 {
            return Err(DeployError::ValidationError(
                "keep_releases must be at least 1".to_string(),
            ));
        }

        if let Some(domain) = self.domains.iter().find(|d| !is_valid_domain(d)) {
            return Err(DeployError::ValidationError(format!(
                "invalid domain {domain:?}"
            )));
        }

        if self.database_url().map_or(true, str::is_empty) {
            return Err(DeployError::ValidationError(format!(
                "environment must define {DATABASE_URL_KEY}"
            )));
        }

        let Some(scm) = self.scm_config() else {
            return Ok(None);
        };

        let kind = scm.kind()?;
        if kind != ScmType::Other && scm.repository.is_empty() {
            return Err(DeployError::ValidationError(format!(
                "{kind} source requires a repository"
            )));
        }

        Ok(Some(kind))
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
}
