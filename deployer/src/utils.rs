//! Utility functions

use colored::Colorize;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::deploy::shell::{has_program, CommandRunner};

/// Tools the default collaborators shell out to
pub const REQUIRED_TOOLS: &[&str] = &[
    "git", "svn", "tar", "unzip", "aws", "npm", "meteor", "mrt", "runuser", "chown",
];

/// Version information for the deployer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Host facts printed by the diagnostic
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub kernel: Option<String>,
    pub cpus: usize,
    pub total_memory_mb: u64,
}

/// Collect host facts
pub fn host_info() -> HostInfo {
    let sys = System::new_all();
    HostInfo {
        hostname: System::host_name(),
        os: System::long_os_version(),
        kernel: System::kernel_version(),
        cpus: sys.cpus().len(),
        total_memory_mb: sys.total_memory() / (1024 * 1024),
    }
}

/// Which of the required tools resolve on the `PATH`
pub async fn tool_report(runner: &dyn CommandRunner) -> Vec<(&'static str, bool)> {
    let mut report = Vec::with_capacity(REQUIRED_TOOLS.len());
    for tool in REQUIRED_TOOLS {
        report.push((*tool, has_program(runner, tool).await));
    }
    report
}

/// Print host info and tool availability
pub async fn run_diagnostic(runner: &dyn CommandRunner) {
    let version = version_info();
    let host = host_info();

    println!("meteor-deploy {} ({})", version.version, version.git_hash);
    println!();
    println!("Host:    {}", host.hostname.as_deref().unwrap_or("unknown"));
    println!("OS:      {}", host.os.as_deref().unwrap_or("unknown"));
    println!("Kernel:  {}", host.kernel.as_deref().unwrap_or("unknown"));
    println!("CPUs:    {}", host.cpus);
    println!("Memory:  {} MB", host.total_memory_mb);
    println!();
    println!("Tools:");
    for (tool, present) in tool_report(runner).await {
        let status = if present {
            "found".green()
        } else {
            "missing".red()
        };
        println!("  {:<8} {}", tool, status);
    }
}
