//! Data models

pub mod descriptor;
pub mod release;
pub mod report;
