//! ---
//! omnii_section: "01-core-functionality"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Shared primitives and utilities for the connector runtime."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Build metadata reported on startup and in heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    /// Semantic version of the workspace.
    pub semver: String,
    /// Build profile the binary was produced with.
    pub profile: String,
}

impl VersionInfo {
    /// Capture the version metadata baked in at compile time.
    pub fn current() -> Self {
        Self {
            semver: env!("CARGO_PKG_VERSION").to_owned(),
            profile: if cfg!(debug_assertions) {
                "debug".to_owned()
            } else {
                "release".to_owned()
            },
        }
    }

    /// Extended single-line form used by `--version`.
    pub fn extended(&self) -> String {
        format!("Omnii connector {} ({})", self.semver, self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_reflects_cargo_metadata() {
        let version = VersionInfo::current();
        assert_eq!(version.semver, env!("CARGO_PKG_VERSION"));
        assert!(version.extended().contains(&version.semver));
    }
}
