//! Meteor Deploy Library
//!
//! Deploys Meteor applications onto an application server: source
//! checkout, bundling, runtime bootstrap generation and release
//! management.

pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod installer;
pub mod logs;
pub mod models;
pub mod storage;
pub mod utils;
