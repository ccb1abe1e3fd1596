//! Deployment module

pub mod bootstrap;
pub mod build;
pub mod collaborators;
pub mod fsm;
pub mod git;
pub mod helpers;
pub mod logrotate;
pub mod orchestrator;
pub mod packages;
pub mod patch;
pub mod prepare;
pub mod release;
pub mod scm;
pub mod shell;
pub mod svn;
