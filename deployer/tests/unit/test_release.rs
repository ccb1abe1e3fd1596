//! Release manager tests

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::fs;

use meteor_deploy::deploy::collaborators::ReleaseManager;
use meteor_deploy::deploy::release::{current_release, LocalReleaseManager};
use meteor_deploy::errors::DeployError;
use meteor_deploy::models::descriptor::DeployAction;
use meteor_deploy::models::release::{ReleaseRequest, ScmBranch};
use meteor_deploy::storage::layout::DeployLayout;

use crate::support::{CountingHooks, RecordingRunner, Sandbox};

fn request(sandbox: &Sandbox, keep_releases: usize) -> ReleaseRequest {
    ReleaseRequest {
        application: "shop".to_string(),
        deploy_to: sandbox.deploy_to(),
        keep_releases,
        repository: "git@github.com:example/shop.git".to_string(),
        user: "deploy".to_string(),
        group: "www-data".to_string(),
        home: sandbox.path("home/deploy"),
        revision: Some("master".to_string()),
        migrate: false,
        migrate_command: String::new(),
        environment: BTreeMap::from([(
            "MONGO_URL".to_string(),
            "mongodb://db/shop".to_string(),
        )]),
        symlink_before_migrate: BTreeMap::new(),
        action: DeployAction::Deploy,
        scm: ScmBranch::Git {
            enable_submodules: true,
            shallow_clone: false,
        },
    }
}

#[tokio::test]
async fn test_releases_are_pruned_to_keep_releases() {
    let sandbox = Sandbox::new("release-prune").await;
    let runner = Arc::new(RecordingRunner::new());
    let manager = LocalReleaseManager::new(runner.clone());
    let hooks = CountingHooks::default();
    let request = request(&sandbox, 2);

    let mut created = Vec::new();
    for _ in 0..3 {
        created.push(tokio_test::assert_ok!(manager.create_release(&request, &hooks).await));
    }

    let layout = DeployLayout::new(sandbox.deploy_to());
    let remaining = layout.releases_dir().list_dirs().await.unwrap();
    assert_eq!(remaining, vec![created[1].path.clone(), created[2].path.clone()]);
    assert_eq!(current_release(&layout).await, Some(created[2].path.clone()));
    assert_eq!(hooks.before_migrate.load(Ordering::SeqCst), 3);
    assert_eq!(hooks.before_restart.load(Ordering::SeqCst), 3);

    // Cloned once, fetched on every deploy, submodules updated
    let lines = runner.lines();
    assert_eq!(lines.iter().filter(|l| l.contains(" clone ")).count(), 1);
    assert_eq!(lines.iter().filter(|l| l.contains(" fetch ")).count(), 3);
    assert!(lines.iter().any(|l| l.contains("submodule update --init --recursive")));

    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_release_links_shared_paths_and_migrates() {
    let sandbox = Sandbox::new("release-migrate").await;
    let runner = Arc::new(RecordingRunner::new());
    let manager = LocalReleaseManager::new(runner.clone());
    let hooks = CountingHooks::default();
    let mut request = request(&sandbox, 5);
    request.migrate = true;
    request.migrate_command = "node migrate.js".to_string();
    request
        .symlink_before_migrate
        .insert("config/settings.json".to_string(), "config/settings.json".to_string());

    let release = tokio_test::assert_ok!(manager.create_release(&request, &hooks).await);

    let link = fs::read_link(release.join("config/settings.json")).await.unwrap();
    assert_eq!(link, sandbox.deploy_to().join("shared/config/settings.json"));

    let migrate = runner
        .commands()
        .into_iter()
        .find(|cmd| cmd.args.iter().any(|a| a == "node migrate.js"))
        .expect("migration command");
    assert_eq!(migrate.cwd.as_deref(), Some(release.path.as_path()));
    assert_eq!(migrate.user.as_deref(), Some("deploy"));
    assert_eq!(
        migrate.env.get("MONGO_URL").map(String::as_str),
        Some("mongodb://db/shop")
    );

    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_rollback_switches_current_back() {
    let sandbox = Sandbox::new("release-rollback").await;
    let runner = Arc::new(RecordingRunner::new());
    let manager = LocalReleaseManager::new(runner.clone());
    let hooks = CountingHooks::default();
    let mut request = request(&sandbox, 5);

    let first = tokio_test::assert_ok!(manager.create_release(&request, &hooks).await);
    let second = tokio_test::assert_ok!(manager.create_release(&request, &hooks).await);

    request.action = DeployAction::Rollback;
    let rolled_back = tokio_test::assert_ok!(manager.create_release(&request, &hooks).await);

    let layout = DeployLayout::new(sandbox.deploy_to());
    assert_eq!(rolled_back.path, first.path);
    assert_eq!(current_release(&layout).await, Some(first.path.clone()));
    assert!(!second.path.exists());
    assert_eq!(hooks.before_restart.load(Ordering::SeqCst), 3);

    // Nothing earlier than the first release
    let err = tokio_test::assert_err!(manager.create_release(&request, &hooks).await);
    assert!(matches!(err, DeployError::ReleaseError(_)));
    assert_eq!(current_release(&layout).await, Some(first.path));

    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_failed_checkout_creates_no_release() {
    let sandbox = Sandbox::new("release-fail").await;
    let runner = Arc::new(RecordingRunner::failing_on(" fetch "));
    let manager = LocalReleaseManager::new(runner);
    let hooks = CountingHooks::default();

    let err = tokio_test::assert_err!(manager.create_release(&request(&sandbox, 5), &hooks).await);

    assert!(matches!(err, DeployError::CheckoutError(_)));
    let layout = DeployLayout::new(sandbox.deploy_to());
    assert!(layout.releases_dir().list_dirs().await.unwrap().is_empty());
    assert!(current_release(&layout).await.is_none());
    assert_eq!(hooks.before_migrate.load(Ordering::SeqCst), 0);

    sandbox.cleanup().await;
}
