//! ---
//! omnii_section: "03-persistence-logging"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Enrollment persistence and credential storage."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;

/// Credential issued once by a successful enrollment.
///
/// Field names match the on-disk document written by earlier connector
/// generations, so an upgraded add-on picks up its existing enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Installation identifier assigned by the Omnii service.
    pub instance_id: String,
    /// Bearer token exchanged for sessions on every handshake.
    pub token: String,
}

impl Credential {
    fn is_usable(&self) -> bool {
        !self.instance_id.trim().is_empty() && !self.token.trim().is_empty()
    }
}

/// Stores the credential document at a fixed well-known path.
#[derive(Debug, Clone)]
pub struct EnrollmentStore {
    path: PathBuf,
}

impl EnrollmentStore {
    /// Create a store bound to the given credential path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the credential document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted credential.
    ///
    /// A missing, unreadable, or corrupted document means "not enrolled" and
    /// returns `Ok(None)`; it is never a fatal condition.
    pub fn load(&self) -> Result<Option<Credential>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "credential file unreadable; treating as not enrolled");
                return Ok(None);
            }
        };

        match serde_json::from_str::<Credential>(&raw) {
            Ok(credential) if credential.is_usable() => {
                debug!(instance_id = %credential.instance_id, "loaded persisted credential");
                Ok(Some(credential))
            }
            Ok(_) => {
                warn!(path = %self.path.display(), "credential file has empty fields; treating as not enrolled");
                Ok(None)
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "credential file corrupted; treating as not enrolled");
                Ok(None)
            }
        }
    }

    /// Persist the credential atomically.
    ///
    /// The document is written to a sibling temp file, restricted to the
    /// owner, and renamed over the destination so a crash can never expose a
    /// partial write.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.tmp_path();
        let mut file = File::create(&tmp_path)?;
        file.write_all(&serde_json::to_vec_pretty(credential)?)?;
        file.sync_all()?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), instance_id = %credential.instance_id, "credential persisted");
        Ok(())
    }

    /// Remove the persisted credential, forcing re-enrollment on next start.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn credential() -> Credential {
        Credential {
            instance_id: "inst-0001".into(),
            token: "tok-secret".into(),
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = EnrollmentStore::new(dir.path().join("credentials.json"));

        assert!(store.load().unwrap().is_none());
        store.save(&credential()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential()));
    }

    #[test]
    fn document_uses_legacy_field_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = EnrollmentStore::new(&path);
        store.save(&credential()).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("instanceId"));
        assert!(raw.contains("token"));
    }

    #[test]
    fn corrupted_document_loads_as_not_enrolled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "{ not json").unwrap();

        let store = EnrollmentStore::new(&path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn empty_fields_load_as_not_enrolled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, r#"{"instanceId": "", "token": "tok"}"#).unwrap();

        let store = EnrollmentStore::new(&path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn stale_temp_file_does_not_shadow_the_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        // Simulates a crash between the temp write and the rename.
        fs::write(path.with_file_name("credentials.json.tmp"), "garbage").unwrap();

        let store = EnrollmentStore::new(&path);
        assert!(store.load().unwrap().is_none());
        store.save(&credential()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential()));
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = EnrollmentStore::new(dir.path().join("credentials.json"));
        store.save(&credential()).unwrap();

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn document_is_owner_readable_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = EnrollmentStore::new(&path);
        store.save(&credential()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
