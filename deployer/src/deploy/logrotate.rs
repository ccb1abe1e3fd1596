//! Log rotation configuration

use std::path::{Path, PathBuf};

/// Mode of the generated config file
pub const LOGROTATE_MODE: u32 = 0o644;

/// Owner of the generated config file
pub const LOGROTATE_OWNER: &str = "root:root";

/// Path of an application's log-rotation config
pub fn config_path(logrotate_dir: &Path, application: &str) -> PathBuf {
    logrotate_dir.join(format!("meteor_app_{application}"))
}

/// Rotation policy for a set of log directories
#[derive(Debug, Clone, Default)]
pub struct LogRotateConfig {
    log_dirs: Vec<PathBuf>,
}

impl LogRotateConfig {
    pub fn new(log_dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            log_dirs: log_dirs.into_iter().collect(),
        }
    }

    pub fn render(&self) -> String {
        self.log_dirs
            .iter()
            .map(|dir| {
                format!(
                    "{}/*.log {{\n  daily\n  missingok\n  rotate 30\n  compress\n  delaycompress\n  notifempty\n  copytruncate\n  sharedscripts\n}}\n",
                    dir.display()
                )
            })
            .collect()
    }
}
