//! Installer tests

use meteor_deploy::installer::install::{install_meteor, InstallOutcome};

use crate::support::RecordingRunner;

#[tokio::test]
async fn test_install_skipped_when_meteor_present() {
    let runner = RecordingRunner::new();

    let outcome = install_meteor(&runner, "https://install.meteor.com").await;

    assert_eq!(tokio_test::assert_ok!(outcome), InstallOutcome::AlreadyInstalled);
    assert!(runner.lines().iter().all(|line| !line.contains("curl")));
}

#[tokio::test]
async fn test_install_runs_installer_when_missing() {
    let runner = RecordingRunner::failing_on("command -v meteor");

    let outcome = install_meteor(&runner, "https://install.meteor.com").await;

    assert_eq!(tokio_test::assert_ok!(outcome), InstallOutcome::Installed);
    let lines = runner.lines();
    assert!(lines
        .iter()
        .any(|line| line.contains("curl -sSL https://install.meteor.com | /bin/sh")));
}
