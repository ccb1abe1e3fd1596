//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::{LogLevel, LogOptions};

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/meteor-deploy/settings.json";

/// Placeholder replaced with the application name in `restart_command`
const APPLICATION_PLACEHOLDER: &str = "{application}";

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Scratch directory used while bundling
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Directory receiving log-rotation configs
    #[serde(default = "default_logrotate_dir")]
    pub logrotate_dir: PathBuf,

    /// Group of the web server, owner group of bundle files
    #[serde(default = "default_web_group")]
    pub web_group: String,

    /// Process manager command restarting the application
    #[serde(default = "default_restart_command")]
    pub restart_command: String,

    /// Extra arguments for `npm install` when auto-install is enabled
    #[serde(default)]
    pub npm_install_options: String,

    /// Minimum Node version written into the bundle's boot scripts
    #[serde(default = "default_node_version_floor")]
    pub node_version_floor: String,

    /// Port the Meteor server listens on
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Port of the TLS reverse proxy
    #[serde(default = "default_https_port")]
    pub https_port: u16,

    /// Installer script for the Meteor toolchain
    #[serde(default = "default_meteor_install_url")]
    pub meteor_install_url: String,
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/tmp/meteor_tmp")
}

fn default_logrotate_dir() -> PathBuf {
    PathBuf::from("/etc/logrotate.d")
}

fn default_web_group() -> String {
    "www-data".to_string()
}

fn default_restart_command() -> String {
    format!("monit restart node_web_app_{APPLICATION_PLACEHOLDER}")
}

fn default_node_version_floor() -> String {
    "v0.10.29".to_string()
}

fn default_http_port() -> u16 {
    80
}

fn default_https_port() -> u16 {
    443
}

fn default_meteor_install_url() -> String {
    "https://install.meteor.com".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            scratch_dir: default_scratch_dir(),
            logrotate_dir: default_logrotate_dir(),
            web_group: default_web_group(),
            restart_command: default_restart_command(),
            npm_install_options: String::new(),
            node_version_floor: default_node_version_floor(),
            http_port: default_http_port(),
            https_port: default_https_port(),
            meteor_install_url: default_meteor_install_url(),
        }
    }
}

impl Settings {
    /// Load settings from `file`, falling back to defaults when it is absent
    pub async fn load_or_default(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json().await
    }

    /// Restart command with the application name filled in
    pub fn restart_command_for(&self, application: &str) -> String {
        self.restart_command
            .replace(APPLICATION_PLACEHOLDER, application)
    }

    /// Logging options derived from these settings
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level.clone(),
            stdout: true,
            log_dir: self.log_dir.clone(),
            json_format: self.log_json,
        }
    }
}
