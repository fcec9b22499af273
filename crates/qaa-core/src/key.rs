//! License key format.
//!
//! Keys look like `PREFIX-XXXX-XXXX-XXXX-XXXX`: a fixed per-product prefix
//! followed by four groups of four uppercase alphanumeric characters.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// A license key that has passed format validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LicenseKey(String);

impl LicenseKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix plus first group, safe to log.
    pub fn log_prefix(&self) -> &str {
        let end = self
            .0
            .match_indices('-')
            .nth(1)
            .map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LicenseKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validator for one product's key format.
#[derive(Debug, Clone)]
pub struct KeyFormat {
    prefix: String,
    pattern: Regex,
}

impl KeyFormat {
    /// Build the format for a product prefix. The prefix itself must be
    /// non-empty uppercase alphanumeric.
    pub fn new(prefix: &str) -> Result<Self> {
        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(Error::Config(format!("Invalid license key prefix: {:?}", prefix)));
        }

        let pattern = Regex::new(&format!(
            r"^{}(?:-[A-Z0-9]{{4}}){{4}}$",
            regex::escape(prefix)
        ))
        .map_err(|e| Error::Internal(format!("Invalid key pattern: {}", e)))?;

        Ok(Self {
            prefix: prefix.to_string(),
            pattern,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Validate a raw key. Surrounding whitespace is ignored; case is not.
    pub fn parse(&self, raw: &str) -> Result<LicenseKey> {
        let candidate = raw.trim();
        if self.pattern.is_match(candidate) {
            Ok(LicenseKey(candidate.to_string()))
        } else {
            Err(Error::Format("Invalid license key format".to_string()))
        }
    }

    pub fn is_valid(&self, raw: &str) -> bool {
        self.parse(raw).is_ok()
    }
}
