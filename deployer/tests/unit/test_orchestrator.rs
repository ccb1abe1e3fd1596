//! Orchestrator tests driven with recording collaborators

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;
use tokio::fs;

use meteor_deploy::deploy::fsm::DeploymentState;
use meteor_deploy::deploy::orchestrator::Orchestrator;
use meteor_deploy::deploy::scm::ResolvedScmType;
use meteor_deploy::errors::DeployError;
use meteor_deploy::filesys::dir::Dir;
use meteor_deploy::models::release::ScmBranch;
use meteor_deploy::storage::layout::DeployLayout;

use crate::support::{git_scm, FakePreparer, FakeReleaseManager, RecordingRunner, Sandbox};

#[tokio::test]
async fn test_git_deployment_end_to_end() {
    let sandbox = Sandbox::new("orchestrator-e2e").await;
    let runner = Arc::new(RecordingRunner::new());
    let orchestrator = Orchestrator::new(sandbox.settings(), sandbox.collaborators(runner.clone()));
    let descriptor = sandbox.descriptor(git_scm());

    let report = tokio_test::assert_ok!(orchestrator.deploy(&descriptor).await);
    assert_eq!(report.state, DeploymentState::Completed);
    assert_eq!(report.resolved_scm_type, Some(ResolvedScmType::Git));

    // Exactly one release, activated through `current`
    let layout = DeployLayout::new(sandbox.deploy_to());
    let releases = layout.releases_dir().list_dirs().await.unwrap();
    assert_eq!(releases.len(), 1);
    let current = fs::read_link(layout.current_link()).await.unwrap();
    assert_eq!(current, releases[0]);
    let release = report.release.expect("release");
    assert_eq!(release.path, releases[0]);
    assert_eq!(release.revision.as_deref(), Some("0123456789abcdef"));

    // Bootstrap file
    let server_js = fs::read_to_string(release.path.join("server.js")).await.unwrap();
    assert_eq!(report.bootstrap_file, Some(release.path.join("server.js")));
    assert!(server_js.contains("process.env.ROOT_URL = \"http://app.example.com\";"));
    assert!(server_js.contains("process.env.MONGO_URL = \"mongodb://db.internal:27017/shop\";"));
    assert!(server_js.contains("process.env.PORT = 80;"));
    assert!(server_js.contains("require(\"./bundle/main.js\");"));
    assert!(server_js.contains("} catch(err) {}"));

    // Bundle copied and patched, VCS metadata left behind
    assert!(release.path.join("bundle/main.js").exists());
    assert!(!release.path.join(".git").exists());
    let boot = fs::read_to_string(release.path.join("bundle/programs/server/boot.js"))
        .await
        .unwrap();
    assert!(boot.contains("MIN_NODE_VERSION = 'v0.10.29';"));
    assert!(!sandbox.path("meteor_tmp").exists());

    // Log rotation
    let logrotate = fs::read_to_string(&report.logrotate_file).await.unwrap();
    assert_eq!(report.logrotate_file, sandbox.path("logrotate.d/meteor_app_shop"));
    assert!(logrotate.contains(&format!("{}/*.log", layout.shared_log_dir().path().display())));

    // Commands
    let lines = runner.lines();
    let position = |needle: &str| {
        lines
            .iter()
            .position(|line| line.contains(needle))
            .unwrap_or_else(|| panic!("no command containing {needle:?} in {lines:#?}"))
    };
    assert!(position("mrt install") < position("meteor bundle bundled_app.tgz"));
    assert!(position("meteor bundle") < position("tar -xzf bundled_app.tgz"));
    assert!(position("npm install http-proxy") < position("monit restart node_web_app_shop"));
    position("chown root:root");

    // The npm install helper only runs with auto_npm_install_on_deploy
    let commands = runner.commands();
    assert!(!commands
        .iter()
        .any(|cmd| cmd.program == "npm" && cmd.args == ["install"]));

    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_auto_npm_install_runs_helper() {
    let sandbox = Sandbox::new("orchestrator-npm").await;
    let runner = Arc::new(RecordingRunner::new());
    let mut settings = sandbox.settings();
    settings.npm_install_options = "--production".to_string();
    let orchestrator = Orchestrator::new(settings, sandbox.collaborators(runner.clone()));
    let mut descriptor = sandbox.descriptor(git_scm());
    descriptor.auto_npm_install_on_deploy = true;

    tokio_test::assert_ok!(orchestrator.deploy(&descriptor).await);

    assert!(runner
        .commands()
        .iter()
        .any(|cmd| cmd.program == "npm" && cmd.args == ["install", "--production"]));
    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_archive_and_s3_resolve_to_local_git() {
    for (scm_type, repository) in [
        ("archive", "https://downloads.example.com/shop.tar.gz"),
        ("s3", "s3://releases/shop.tar.gz"),
    ] {
        let sandbox = Sandbox::new("orchestrator-archive").await;
        let runner = Arc::new(RecordingRunner::new());
        let releases = Arc::new(FakeReleaseManager::new(sandbox.path("releases/1")));
        let materialized = sandbox.path("materialized/archive.d");

        let mut collaborators = sandbox.collaborators(runner.clone());
        collaborators.releases = releases.clone();
        let preparer = Arc::new(FakePreparer::new(&materialized));
        collaborators.preparer = preparer.clone();
        let orchestrator = Orchestrator::new(sandbox.settings(), collaborators);
        let descriptor = sandbox.descriptor(json!({
            "scm_type": scm_type,
            "repository": repository,
            "revision": "v2"
        }));

        let report = tokio_test::assert_ok!(orchestrator.deploy(&descriptor).await);

        assert_eq!(report.scm_type.as_deref(), Some(scm_type));
        assert_eq!(report.resolved_scm_type, Some(ResolvedScmType::Git));
        assert_eq!(releases.calls(), 1);
        let requests = releases.requests.lock().unwrap().clone();
        assert_eq!(requests[0].repository, materialized.to_string_lossy());
        assert!(requests[0].revision.is_none());
        assert!(matches!(requests[0].scm, ScmBranch::Git { .. }));
        // Downloads are dropped once the release has cloned them
        assert_eq!(preparer.discarded.load(Ordering::SeqCst), 1);

        sandbox.cleanup().await;
    }
}

#[tokio::test]
async fn test_other_skips_release_but_registers_log_rotation() {
    let sandbox = Sandbox::new("orchestrator-other").await;
    let runner = Arc::new(RecordingRunner::new());
    let releases = Arc::new(FakeReleaseManager::new(sandbox.path("unused")));
    let mut collaborators = sandbox.collaborators(runner.clone());
    collaborators.releases = releases.clone();
    let orchestrator = Orchestrator::new(sandbox.settings(), collaborators);
    let descriptor = sandbox.descriptor(json!({ "scm_type": "other" }));

    let report = tokio_test::assert_ok!(orchestrator.deploy(&descriptor).await);

    assert_eq!(releases.calls(), 0);
    assert!(report.release.is_none());
    assert!(report.bootstrap_file.is_none());
    assert_eq!(report.resolved_scm_type, Some(ResolvedScmType::Other));
    assert!(sandbox.path("logrotate.d/meteor_app_shop").exists());
    assert_eq!(orchestrator.state().await, DeploymentState::Completed);
    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_unsupported_scm_type_fails_before_side_effects() {
    let sandbox = Sandbox::new("orchestrator-invalid").await;
    let runner = Arc::new(RecordingRunner::new());
    let releases = Arc::new(FakeReleaseManager::new(sandbox.path("unused")));
    let mut collaborators = sandbox.collaborators(runner.clone());
    collaborators.releases = releases.clone();
    let orchestrator = Orchestrator::new(sandbox.settings(), collaborators);
    let descriptor = sandbox.descriptor(json!({
        "scm_type": "mercurial",
        "repository": "https://hg.example.com/shop"
    }));

    let err = tokio_test::assert_err!(orchestrator.deploy(&descriptor).await);

    assert!(matches!(&err, DeployError::UnsupportedScm(value) if value == "mercurial"));
    assert!(err.to_string().contains("mercurial"));
    assert_eq!(releases.calls(), 0);
    assert!(runner.commands().is_empty());
    assert!(!Dir::new(sandbox.deploy_to()).exists().await);
    assert_eq!(orchestrator.state().await, DeploymentState::Failed);
    assert!(orchestrator.last_error().await.unwrap().contains("mercurial"));
    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_home_is_left_untouched() {
    let before = std::env::var_os("HOME");

    // Successful run
    let sandbox = Sandbox::new("orchestrator-home").await;
    let runner = Arc::new(RecordingRunner::new());
    let orchestrator = Orchestrator::new(sandbox.settings(), sandbox.collaborators(runner.clone()));
    tokio_test::assert_ok!(orchestrator.deploy(&sandbox.descriptor(git_scm())).await);
    assert_eq!(std::env::var_os("HOME"), before);

    // Checkout commands see the deploy user's home instead
    let home = sandbox.path("home/deploy");
    let clone = runner
        .commands()
        .into_iter()
        .find(|cmd| cmd.program == "git" && cmd.args.iter().any(|a| a == "clone"))
        .expect("git clone");
    assert_eq!(clone.env.get("HOME").map(String::as_str), Some(home.to_str().unwrap()));
    assert_eq!(clone.user.as_deref(), Some("deploy"));
    sandbox.cleanup().await;

    // Failing run
    let sandbox = Sandbox::new("orchestrator-home-fail").await;
    let runner = Arc::new(RecordingRunner::failing_on("clone -q git@github.com"));
    let orchestrator = Orchestrator::new(sandbox.settings(), sandbox.collaborators(runner));
    tokio_test::assert_err!(orchestrator.deploy(&sandbox.descriptor(git_scm())).await);
    assert_eq!(std::env::var_os("HOME"), before);
    assert_eq!(orchestrator.state().await, DeploymentState::Failed);
    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_no_domains_skips_build() {
    let sandbox = Sandbox::new("orchestrator-nodomain").await;
    let runner = Arc::new(RecordingRunner::new());
    let orchestrator = Orchestrator::new(sandbox.settings(), sandbox.collaborators(runner.clone()));
    let mut descriptor = sandbox.descriptor(git_scm());
    descriptor.domains.clear();

    let report = tokio_test::assert_ok!(orchestrator.deploy(&descriptor).await);

    let release = report.release.expect("release");
    assert!(report.bootstrap_file.is_none());
    assert!(!release.path.join("server.js").exists());
    assert!(!release.path.join("bundle").exists());
    assert!(!sandbox.path("meteor_tmp").exists());
    let lines = runner.lines();
    assert!(!lines
        .iter()
        .any(|line| line.starts_with("mrt") || line.starts_with("meteor") || line.contains("http-proxy")));
    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_missing_bundle_fails_build() {
    let sandbox = Sandbox::new("orchestrator-nobundle").await;
    let runner = Arc::new(RecordingRunner::with_empty_bundle());
    let orchestrator = Orchestrator::new(sandbox.settings(), sandbox.collaborators(runner.clone()));

    let err = tokio_test::assert_err!(orchestrator.deploy(&sandbox.descriptor(git_scm())).await);

    assert!(matches!(err, DeployError::BuildError(_)));
    assert!(!runner.lines().iter().any(|line| line.contains("http-proxy")));
    let layout = DeployLayout::new(sandbox.deploy_to());
    assert!(!fs::try_exists(layout.current_link()).await.unwrap());
    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_scm_config_read_from_environment() {
    let sandbox = Sandbox::new("orchestrator-env-scm").await;
    let runner = Arc::new(RecordingRunner::new());
    let releases = Arc::new(FakeReleaseManager::new(sandbox.path("releases/1")));
    let mut collaborators = sandbox.collaborators(runner.clone());
    collaborators.releases = releases.clone();
    let orchestrator = Orchestrator::new(sandbox.settings(), collaborators);

    let mut descriptor = sandbox.descriptor(serde_json::Value::Null);
    descriptor
        .environment
        .insert("scm__scm_type".to_string(), "svn".to_string());
    descriptor.environment.insert(
        "scm__repository".to_string(),
        "https://svn.example.com/shop/trunk".to_string(),
    );
    descriptor
        .environment
        .insert("scm__user".to_string(), "builder".to_string());

    let report = tokio_test::assert_ok!(orchestrator.deploy(&descriptor).await);

    assert_eq!(report.resolved_scm_type, Some(ResolvedScmType::Svn));
    let requests = releases.requests.lock().unwrap().clone();
    assert_eq!(requests[0].repository, "https://svn.example.com/shop/trunk");
    match &requests[0].scm {
        ScmBranch::Subversion {
            username,
            svn_arguments,
            svn_info_args,
            ..
        } => {
            assert_eq!(username.as_deref(), Some("builder"));
            assert_eq!(svn_arguments, "--no-auth-cache --non-interactive --trust-server-cert");
            assert_eq!(svn_info_args, svn_arguments);
        }
        other => panic!("expected subversion branch, got {other:?}"),
    }
    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_blank_scm_type_in_environment_aborts() {
    let sandbox = Sandbox::new("orchestrator-blank-scm").await;
    let runner = Arc::new(RecordingRunner::new());
    let releases = Arc::new(FakeReleaseManager::new(sandbox.path("unused")));
    let mut collaborators = sandbox.collaborators(runner.clone());
    collaborators.releases = releases.clone();
    let orchestrator = Orchestrator::new(sandbox.settings(), collaborators);

    let mut descriptor = sandbox.descriptor(serde_json::Value::Null);
    descriptor
        .environment
        .insert("scm__scm_type".to_string(), String::new());
    descriptor.environment.insert(
        "scm__repository".to_string(),
        "git@github.com:example/shop.git".to_string(),
    );

    let err = tokio_test::assert_err!(orchestrator.deploy(&descriptor).await);

    assert!(matches!(&err, DeployError::UnsupportedScm(value) if value.is_empty()));
    assert_eq!(releases.calls(), 0);
    assert!(runner.commands().is_empty());
    assert!(!sandbox.path("logrotate.d/meteor_app_shop").exists());
    assert_eq!(orchestrator.state().await, DeploymentState::Failed);
    sandbox.cleanup().await;
}
