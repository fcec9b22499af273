//! On-disk storage for this machine's license record.

use crate::fs::{read_optional, remove_if_exists, write_atomic};
use crate::types::SignedLicense;
use qaa_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Owns the single `license.json` for this machine.
#[derive(Debug, Clone)]
pub struct LocalLicenseStore {
    path: PathBuf,
}

impl LocalLicenseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the record, if any.
    ///
    /// Errors distinguish the two failure classes the validator cares about:
    /// unreadable bytes or non-JSON content surface as [`Error::Io`] or
    /// [`Error::Serialization`]; JSON of the wrong shape (missing or unknown
    /// fields) surfaces as [`Error::Format`].
    pub fn load(&self) -> Result<Option<SignedLicense>> {
        let Some(bytes) = read_optional(&self.path)? else {
            debug!(path = %self.path.display(), "No license file");
            return Ok(None);
        };

        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        let record = serde_json::from_value(value)
            .map_err(|e| Error::Format(format!("Invalid license file: {}", e)))?;
        Ok(Some(record))
    }

    pub fn save(&self, license: &SignedLicense) -> Result<()> {
        let json = serde_json::to_vec_pretty(license)?;
        write_atomic(&self.path, &json)?;
        debug!(path = %self.path.display(), "License file written");
        Ok(())
    }

    /// Delete the record. Removing a missing record is not an error.
    pub fn remove(&self) -> Result<bool> {
        remove_if_exists(&self.path)
    }
}
