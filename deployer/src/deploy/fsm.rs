//! Finite State Machine tracking the phases of a deployment run

use serde::{Deserialize, Serialize};

/// Deployment phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    /// Not started, or reset after a previous run
    Pending,

    /// Validating the descriptor, preparing directories and SCM tooling
    Preparing,

    /// Release manager is checking out and building a release
    Releasing,

    /// Writing post-release configuration (log rotation)
    Finalizing,

    /// All phases finished
    Completed,

    /// A phase failed and the remaining ones were aborted
    Failed,
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Begin the run
    Start,

    /// Hand over to the release manager
    Release,

    /// No checkout for this source type
    SkipRelease,

    /// Release created and activated
    Released,

    /// Post-release configuration written
    Complete,

    /// A phase failed
    Fail(String),

    /// Back to pending for another run
    Reset,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    error: Option<String>,
    failures: u32,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: DeploymentState::Pending,
            error: None,
            failures: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of failed runs since creation
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether the run has ended, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            DeploymentState::Completed | DeploymentState::Failed
        )
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (DeploymentState::Pending, DeploymentEvent::Start) => {
                self.error = None;
                DeploymentState::Preparing
            }

            (DeploymentState::Preparing, DeploymentEvent::Release) => DeploymentState::Releasing,
            (DeploymentState::Preparing, DeploymentEvent::SkipRelease) => {
                DeploymentState::Finalizing
            }

            (DeploymentState::Releasing, DeploymentEvent::Released) => DeploymentState::Finalizing,

            (DeploymentState::Finalizing, DeploymentEvent::Complete) => DeploymentState::Completed,

            (
                DeploymentState::Pending
                | DeploymentState::Preparing
                | DeploymentState::Releasing
                | DeploymentState::Finalizing,
                DeploymentEvent::Fail(err),
            ) => {
                self.error = Some(err.clone());
                self.failures += 1;
                DeploymentState::Failed
            }

            (DeploymentState::Completed | DeploymentState::Failed, DeploymentEvent::Reset) => {
                self.error = None;
                DeploymentState::Pending
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
