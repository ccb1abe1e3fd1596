//! Meteor toolchain installation

use tracing::{error, info};

use crate::deploy::shell::{has_program, shell_quote, CommandRunner, ShellCommand};
use crate::errors::DeployError;

/// Whether the installer ran or the toolchain was already present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
}

/// `curl <url> | /bin/sh`
pub fn installer_command(install_url: &str) -> ShellCommand {
    ShellCommand::script(format!("curl -sSL {} | /bin/sh", shell_quote(install_url)))
}

/// Install the Meteor toolchain unless `meteor` is already on the `PATH`
pub async fn install_meteor(
    runner: &dyn CommandRunner,
    install_url: &str,
) -> Result<InstallOutcome, DeployError> {
    if has_program(runner, "meteor").await {
        info!("Meteor is already installed");
        return Ok(InstallOutcome::AlreadyInstalled);
    }

    info!("Installing Meteor from {}", install_url);
    runner.run(&installer_command(install_url)).await?;
    Ok(InstallOutcome::Installed)
}

/// Run the installer from the command line
pub async fn install(runner: &dyn CommandRunner, install_url: &str) {
    match install_meteor(runner, install_url).await {
        Ok(InstallOutcome::Installed) => {
            println!("\n[SUCCESS] Meteor installed");
        }
        Ok(InstallOutcome::AlreadyInstalled) => {
            println!("\n[OK] Meteor is already installed");
        }
        Err(e) => {
            error!("Installation failed: {:?}", e);
            eprintln!("\n[ERROR] Installation failed: {}", e);
            std::process::exit(1);
        }
    }
}
