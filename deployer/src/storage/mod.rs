//! On-disk settings and deploy target layout

pub mod layout;
pub mod settings;
