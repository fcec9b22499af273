//! Entry points for the rest of the CLI.

use crate::clock::{Clock, SystemClock};
use crate::features;
use crate::registry::{HttpRegistrySource, RegistrySource};
use crate::types::LicenseInfo;
use crate::usage::{CapCheck, UsageTracker};
use crate::validator::LicenseValidator;
use qaa_core::{LicensingConfig, OperationKind, Result};
use std::sync::Arc;
use tracing::warn;

/// License activation, validation, feature gating and usage caps.
///
/// Feature and cap checks resolve the tier from the local record on every
/// call. In dev mode they always allow.
pub struct LicenseService {
    validator: LicenseValidator,
    usage: UsageTracker,
    dev_mode: bool,
}

impl LicenseService {
    pub fn new(config: &LicensingConfig) -> Result<Self> {
        let source = HttpRegistrySource::new(&config.registry_url, config.registry_timeout)?;
        Self::with_source(config, Arc::new(source), Arc::new(SystemClock))
    }

    pub fn with_source(
        config: &LicensingConfig,
        source: Arc<dyn RegistrySource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.dev_mode {
            warn!("Developer mode enabled: license enforcement is disabled");
        }

        Ok(Self {
            validator: LicenseValidator::with_parts(config, source, clock.clone())?,
            usage: UsageTracker::from_config(config, clock),
            dev_mode: config.dev_mode,
        })
    }

    pub fn validator(&self) -> &LicenseValidator {
        &self.validator
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub async fn activate(&self, key: &str, email: &str) -> LicenseInfo {
        self.validator.activate(key, email).await
    }

    pub fn get_info(&self) -> LicenseInfo {
        self.validator.get_info()
    }

    pub fn remove_license(&self) -> Result<()> {
        self.validator.remove_license()
    }

    pub fn has_feature(&self, name: &str) -> bool {
        if self.dev_mode {
            warn!(feature = name, "Developer mode: feature check bypassed");
            return true;
        }
        features::has_feature(self.get_info().tier(), name)
    }

    pub fn check_cap(&self, kind: OperationKind) -> CapCheck {
        if self.dev_mode {
            warn!(operation = %kind, "Developer mode: usage cap bypassed");
            return CapCheck::unlimited();
        }
        self.usage.check_cap(self.get_info().tier(), kind)
    }

    /// Record one run of `kind` against the current tier.
    pub fn increment_usage(&self, kind: OperationKind) -> Result<u64> {
        self.usage.increment_usage(self.get_info().tier(), kind)
    }
}
