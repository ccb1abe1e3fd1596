//! Meteor Deploy - Entry Point
//!
//! Deploys a Meteor application described by a JSON descriptor onto the
//! local application server.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tracing::{error, info};

use meteor_deploy::deploy::collaborators::Collaborators;
use meteor_deploy::deploy::orchestrator::Orchestrator;
use meteor_deploy::deploy::shell::{CommandRunner, ProcessRunner};
use meteor_deploy::filesys::file::File;
use meteor_deploy::installer::install::install;
use meteor_deploy::logs::init_logging;
use meteor_deploy::models::descriptor::{DeployAction, DeploymentDescriptor};
use meteor_deploy::models::report::DeploymentReport;
use meteor_deploy::storage::settings::{Settings, DEFAULT_SETTINGS_PATH};
use meteor_deploy::utils::{run_diagnostic, version_info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to render version info: {e}"),
        }
        return;
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        run_diagnostic(runner.as_ref()).await;
        return;
    }

    // Retrieve the settings file
    let settings_path = cli_args
        .get("settings")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = match Settings::load_or_default(&File::new(&settings_path)).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} unable to read settings file {}: {}", "error:".red().bold(), settings_path, e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let _log_guard = match init_logging(settings.log_options()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    // Run the installer
    if cli_args.contains_key("install-meteor") {
        return install(runner.as_ref(), &settings.meteor_install_url).await;
    }

    let Some(descriptor_path) = cli_args.get("descriptor").cloned() else {
        eprintln!(
            "{} missing --descriptor=<path>; see --version, --diagnostic, --install-meteor",
            "error:".red().bold()
        );
        std::process::exit(2);
    };

    match run_deploy(&cli_args, &descriptor_path, settings, runner).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to render deployment report: {e}"),
        },
        Err(e) => {
            error!("Deployment failed: {e:#}");
            eprintln!("{} {:#}", "deployment failed:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run_deploy(
    cli_args: &HashMap<String, String>,
    descriptor_path: &str,
    settings: Settings,
    runner: Arc<dyn CommandRunner>,
) -> anyhow::Result<DeploymentReport> {
    let mut descriptor: DeploymentDescriptor = File::new(descriptor_path)
        .read_json()
        .await
        .with_context(|| format!("unable to read descriptor {descriptor_path}"))?;

    if let Some(action) = cli_args.get("action") {
        descriptor.action = action.parse::<DeployAction>()?;
    }

    info!(
        "Running meteor-deploy {} for {}",
        version_info().version,
        descriptor.application
    );
    let orchestrator = Orchestrator::new(settings, Collaborators::system(runner));
    let report = orchestrator.deploy(&descriptor).await?;
    Ok(report)
}
