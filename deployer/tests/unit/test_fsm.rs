//! FSM unit tests

use meteor_deploy::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), &DeploymentState::Pending);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.failures(), 0);
    assert!(!fsm.is_terminal());
}

#[test]
fn test_fsm_release_flow() {
    let mut fsm = DeploymentFsm::new();

    // Pending -> Preparing
    fsm.process(DeploymentEvent::Start).unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Preparing);

    // Preparing -> Releasing -> Finalizing
    fsm.process(DeploymentEvent::Release).unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Releasing);
    fsm.process(DeploymentEvent::Released).unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Finalizing);

    // Finalizing -> Completed
    fsm.process(DeploymentEvent::Complete).unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Completed);
}

#[test]
fn test_fsm_skip_release_flow() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::Start).unwrap();
    fsm.process(DeploymentEvent::SkipRelease).unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Finalizing);

    fsm.process(DeploymentEvent::Complete).unwrap();
    assert!(fsm.is_terminal());
}

#[test]
fn test_fsm_failure_and_reset() {
    let mut fsm = DeploymentFsm::new();

    // First run fails while releasing
    fsm.process(DeploymentEvent::Start).unwrap();
    fsm.process(DeploymentEvent::Release).unwrap();
    fsm.process(DeploymentEvent::Fail("git clone failed".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Failed);
    assert_eq!(fsm.error(), Some("git clone failed"));
    assert_eq!(fsm.failures(), 1);

    // Reset and run again
    fsm.process(DeploymentEvent::Reset).unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Pending);
    assert!(fsm.error().is_none());

    fsm.process(DeploymentEvent::Start).unwrap();
    fsm.process(DeploymentEvent::Fail("mrt install failed".to_string()))
        .unwrap();
    assert_eq!(fsm.failures(), 2);
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = DeploymentFsm::new();

    // Cannot release before starting
    assert!(fsm.process(DeploymentEvent::Release).is_err());

    // Cannot complete while preparing
    fsm.process(DeploymentEvent::Start).unwrap();
    assert!(fsm.process(DeploymentEvent::Complete).is_err());
    assert_eq!(fsm.state(), &DeploymentState::Preparing);

    // Terminal states only accept a reset
    fsm.process(DeploymentEvent::SkipRelease).unwrap();
    fsm.process(DeploymentEvent::Complete).unwrap();
    assert!(fsm.process(DeploymentEvent::Fail("late".to_string())).is_err());
    assert!(fsm.process(DeploymentEvent::Start).is_err());
}
