//! Licensing configuration.
//!
//! Every environment-derived setting lives in [`LicensingConfig`], which is
//! passed into constructors. Nothing in the licensing code reads the process
//! environment on its own.

use crate::error::{Error, Result};
use crate::tier::OperationKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_SECRET: &str = "QAA_LICENSE_SECRET";
pub const ENV_STATE_DIR: &str = "QAA_LICENSE_DIR";
pub const ENV_REGISTRY_URL: &str = "QAA_REGISTRY_URL";
pub const ENV_REGISTRY_TIMEOUT_MS: &str = "QAA_REGISTRY_TIMEOUT_MS";
pub const ENV_REGISTRY_PUBLIC_KEY: &str = "QAA_REGISTRY_PUBLIC_KEY";
pub const ENV_KEY_PREFIX: &str = "QAA_KEY_PREFIX";
pub const ENV_DEV_MODE: &str = "QAA_DEV_MODE";

pub const DEFAULT_REGISTRY_URL: &str = "https://licenses.qaa.dev/registry.json";
pub const DEFAULT_KEY_PREFIX: &str = "QAA";

/// Symmetric secret used to sign local license records.
///
/// Never compiled into the binary; it is supplied at runtime.
#[derive(Clone)]
pub struct SigningSecret(String);

impl SigningSecret {
    /// Fails on an empty or whitespace-only secret.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(Error::Config(format!(
                "License signing secret is empty (set {})",
                ENV_SECRET
            )));
        }
        Ok(Self(secret))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(***)")
    }
}

/// Monthly caps applied to the free tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCaps {
    #[serde(default = "default_max_pre_push")]
    pub max_pre_push_runs_per_month: u64,
    #[serde(default = "default_max_dependency_prs")]
    pub max_dependency_prs_per_month: u64,
}

fn default_max_pre_push() -> u64 {
    50
}

fn default_max_dependency_prs() -> u64 {
    10
}

impl Default for UsageCaps {
    fn default() -> Self {
        Self {
            max_pre_push_runs_per_month: default_max_pre_push(),
            max_dependency_prs_per_month: default_max_dependency_prs(),
        }
    }
}

impl UsageCaps {
    pub fn limit_for(&self, kind: OperationKind) -> u64 {
        match kind {
            OperationKind::PrePush => self.max_pre_push_runs_per_month,
            OperationKind::DependencyPr => self.max_dependency_prs_per_month,
        }
    }
}

/// Configuration for the licensing subsystem.
#[derive(Debug, Clone)]
pub struct LicensingConfig {
    /// Secret for signing and verifying local license records.
    pub signing_secret: SigningSecret,
    /// Directory holding license, registry cache and usage files.
    pub state_dir: PathBuf,
    /// Registry document URL.
    pub registry_url: String,
    /// Upper bound for the registry fetch.
    pub registry_timeout: Duration,
    /// Base64 Ed25519 key that registry documents must be signed with.
    pub registry_public_key: Option<String>,
    /// License key prefix for this product.
    pub key_prefix: String,
    /// Disables all enforcement. Off unless explicitly enabled.
    pub dev_mode: bool,
    /// Free-tier caps.
    pub caps: UsageCaps,
}

impl LicensingConfig {
    /// Create a config with defaults for everything but the secret and state dir.
    pub fn new(signing_secret: SigningSecret, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            signing_secret,
            state_dir: state_dir.into(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            registry_timeout: Duration::from_secs(5),
            registry_public_key: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            dev_mode: false,
            caps: UsageCaps::default(),
        }
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(ENV_SECRET).ok_or_else(|| {
            Error::Config(format!("License signing secret not set ({})", ENV_SECRET))
        })?;
        let signing_secret = SigningSecret::new(secret)?;

        let state_dir = match lookup(ENV_STATE_DIR).filter(|v| !v.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => Self::default_state_dir()?,
        };

        let mut config = Self::new(signing_secret, state_dir);

        if let Some(url) = lookup(ENV_REGISTRY_URL).filter(|v| !v.trim().is_empty()) {
            config.registry_url = url;
        }

        if let Some(ms) = lookup(ENV_REGISTRY_TIMEOUT_MS) {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a number of milliseconds", ENV_REGISTRY_TIMEOUT_MS))
            })?;
            config.registry_timeout = Duration::from_millis(ms);
        }

        config.registry_public_key = lookup(ENV_REGISTRY_PUBLIC_KEY).filter(|v| !v.trim().is_empty());

        if let Some(prefix) = lookup(ENV_KEY_PREFIX).filter(|v| !v.trim().is_empty()) {
            config.key_prefix = prefix;
        }

        config.dev_mode = lookup(ENV_DEV_MODE).is_some_and(|v| parse_flag(&v));

        Ok(config)
    }

    /// Platform data directory for qaa state.
    pub fn default_state_dir() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("dev", "qaa", "qaa")
            .ok_or_else(|| Error::Config("Could not determine state directory".to_string()))?;
        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    pub fn with_registry_timeout(mut self, timeout: Duration) -> Self {
        self.registry_timeout = timeout;
        self
    }

    pub fn with_registry_public_key(mut self, key: impl Into<String>) -> Self {
        self.registry_public_key = Some(key.into());
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    pub fn with_caps(mut self, caps: UsageCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn license_path(&self) -> PathBuf {
        self.state_dir.join("license.json")
    }

    pub fn registry_cache_path(&self) -> PathBuf {
        self.state_dir.join("registry-cache.json")
    }

    pub fn usage_path(&self) -> PathBuf {
        self.state_dir.join("usage.json")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let result = LicensingConfig::from_lookup(lookup_from(&[(ENV_STATE_DIR, "/tmp/qaa")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_secret_is_config_error() {
        let result = LicensingConfig::from_lookup(lookup_from(&[
            (ENV_SECRET, "   "),
            (ENV_STATE_DIR, "/tmp/qaa"),
        ]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = LicensingConfig::from_lookup(lookup_from(&[
            (ENV_SECRET, "s3cret"),
            (ENV_STATE_DIR, "/tmp/qaa-test"),
            (ENV_REGISTRY_URL, "http://localhost:9999/registry.json"),
            (ENV_REGISTRY_TIMEOUT_MS, "250"),
            (ENV_KEY_PREFIX, "ACME"),
            (ENV_DEV_MODE, "TRUE"),
        ]))
        .unwrap();

        assert_eq!(config.state_dir, PathBuf::from("/tmp/qaa-test"));
        assert_eq!(config.registry_url, "http://localhost:9999/registry.json");
        assert_eq!(config.registry_timeout, Duration::from_millis(250));
        assert_eq!(config.key_prefix, "ACME");
        assert!(config.dev_mode);
        assert_eq!(config.license_path(), PathBuf::from("/tmp/qaa-test/license.json"));
    }

    #[test]
    fn test_dev_mode_defaults_off() {
        let config = LicensingConfig::from_lookup(lookup_from(&[
            (ENV_SECRET, "s3cret"),
            (ENV_STATE_DIR, "/tmp/qaa-test"),
        ]))
        .unwrap();
        assert!(!config.dev_mode);
        assert_eq!(config.registry_url, DEFAULT_REGISTRY_URL);

        let config = LicensingConfig::from_lookup(lookup_from(&[
            (ENV_SECRET, "s3cret"),
            (ENV_STATE_DIR, "/tmp/qaa-test"),
            (ENV_DEV_MODE, "maybe"),
        ]))
        .unwrap();
        assert!(!config.dev_mode);
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let result = LicensingConfig::from_lookup(lookup_from(&[
            (ENV_SECRET, "s3cret"),
            (ENV_STATE_DIR, "/tmp/qaa-test"),
            (ENV_REGISTRY_TIMEOUT_MS, "soon"),
        ]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SigningSecret::new("hunter2").unwrap();
        assert_eq!(format!("{:?}", secret), "SigningSecret(***)");
    }

    #[test]
    fn test_default_caps() {
        let caps = UsageCaps::default();
        assert_eq!(caps.limit_for(OperationKind::PrePush), 50);
        assert_eq!(caps.limit_for(OperationKind::DependencyPr), 10);
    }
}
