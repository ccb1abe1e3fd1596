//! Integration tests

mod test_fsm;
mod test_installer;
mod test_orchestrator;
mod test_release;
