//! Node version requirement patch for Meteor bundles
//!
//! Older bundles pin `MIN_NODE_VERSION` to a `v0.10.2x` release that the
//! host may not provide. The boot scripts are rewritten to require the
//! configured floor instead.

use regex::{NoExpand, Regex};
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::release::Release;

/// Boot scripts carrying the version check, relative to the release
pub const BOOT_SCRIPTS: [&str; 2] = [
    "bundle/programs/ctl/boot.js",
    "bundle/programs/server/boot.js",
];

const MIN_NODE_VERSION_PATTERN: &str = r"MIN_NODE_VERSION = 'v0\.10\.2.';";

/// Outcome of patching a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Patched,
    Unchanged,
    Missing,
}

/// Textual substitution of the minimum Node version constant
#[derive(Debug, Clone)]
pub struct NodeVersionPatch {
    pattern: Regex,
    replacement: String,
}

impl NodeVersionPatch {
    pub fn new(floor: &str) -> Result<Self, DeployError> {
        Ok(Self {
            pattern: Regex::new(MIN_NODE_VERSION_PATTERN)?,
            replacement: format!("MIN_NODE_VERSION = '{floor}';"),
        })
    }

    /// Apply the substitution to file contents
    pub fn apply_to_str(&self, contents: &str) -> String {
        self.pattern
            .replace_all(contents, NoExpand(&self.replacement))
            .into_owned()
    }

    /// Patch a file in place. Missing files are reported, not treated as errors.
    pub async fn apply(&self, file: &File) -> Result<PatchOutcome, DeployError> {
        if !file.exists().await {
            return Ok(PatchOutcome::Missing);
        }

        let contents = file.read_string().await?;
        let patched = self.apply_to_str(&contents);
        if patched == contents {
            return Ok(PatchOutcome::Unchanged);
        }

        file.write_string(&patched).await?;
        Ok(PatchOutcome::Patched)
    }

    /// Patch every boot script of a release
    pub async fn apply_to_release(&self, release: &Release) -> Result<(), DeployError> {
        for script in BOOT_SCRIPTS {
            let file = File::new(release.join(script));
            match self.apply(&file).await? {
                PatchOutcome::Patched => debug!("Relaxed Node version check in {}", script),
                PatchOutcome::Unchanged => debug!("No Node version pin in {}", script),
                PatchOutcome::Missing => warn!("Boot script not found: {}", file.path().display()),
            }
        }
        Ok(())
    }
}
