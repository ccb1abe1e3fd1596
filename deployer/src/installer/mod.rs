//! Toolchain installation

pub mod install;
