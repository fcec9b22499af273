//! License activation and validation.
//!
//! [`LicenseValidator::activate`] and [`LicenseValidator::get_info`] are total:
//! every failure becomes a [`LicenseState`] that resolves to the free tier.

use crate::canonical::PAYLOAD_SCHEMA_VERSION;
use crate::clock::{Clock, SystemClock};
use crate::registry::{HttpRegistrySource, RegistryEntry, RegistryLoader, RegistrySource};
use crate::signing::{hash_email, sign, verify};
use crate::store::LocalLicenseStore;
use crate::types::{
    ActiveLicense, LicenseInfo, LicensePayload, LicenseState, SignedLicense, UNVERIFIED_LICENSE,
};
use chrono::{DateTime, Utc};
use qaa_core::{Error, KeyFormat, LicenseKey, LicensingConfig, Result, SigningSecret};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Validates, activates and removes this machine's license.
pub struct LicenseValidator {
    store: LocalLicenseStore,
    loader: RegistryLoader,
    secret: SigningSecret,
    key_format: KeyFormat,
    clock: Arc<dyn Clock>,
}

impl LicenseValidator {
    /// Validator backed by the HTTP registry and the system clock.
    pub fn new(config: &LicensingConfig) -> Result<Self> {
        let source = HttpRegistrySource::new(&config.registry_url, config.registry_timeout)?;
        Self::with_parts(config, Arc::new(source), Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: &LicensingConfig,
        source: Arc<dyn RegistrySource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            store: LocalLicenseStore::new(config.license_path()),
            loader: RegistryLoader::new(source, config)?,
            secret: config.signing_secret.clone(),
            key_format: KeyFormat::new(&config.key_prefix)?,
            clock,
        })
    }

    pub fn store(&self) -> &LocalLicenseStore {
        &self.store
    }

    /// Activate `raw_key` for `email` against the registry.
    ///
    /// Only an `Active` result writes the local record.
    pub async fn activate(&self, raw_key: &str, email: &str) -> LicenseInfo {
        let key = match self.key_format.parse(raw_key) {
            Ok(key) => key,
            Err(e) => {
                warn!("Rejected malformed license key");
                return self.info(LicenseState::InvalidFormat {
                    reason: reason_of(e),
                });
            }
        };

        info!(key_prefix = key.log_prefix(), "Activating license");

        let registry = self.loader.load().await;
        let Some(entry) = registry.lookup(&key) else {
            warn!(key_prefix = key.log_prefix(), "License key not entitled");
            return self.info(LicenseState::NotEntitled);
        };

        if !email_matches(entry, email) {
            warn!(key_prefix = key.log_prefix(), "License email does not match registry");
            return self.info(LicenseState::NotEntitled);
        }

        let now = self.clock.now();
        if let Some(expires) = entry.expires
            && expires <= now
        {
            warn!(key_prefix = key.log_prefix(), expires = %expires, "License has expired");
            return self.info(LicenseState::Expired {
                expired_at: expires,
            });
        }

        let record = match self.seal(&key, entry, email, now) {
            Ok(record) => record,
            Err(e) => {
                warn!(key_prefix = key.log_prefix(), error = %e, "Failed to sign license");
                return self.info(LicenseState::StorageFailed {
                    reason: format!("Failed to sign license: {}", reason_of(e)),
                });
            }
        };

        if let Err(e) = self.store.save(&record) {
            warn!(key_prefix = key.log_prefix(), error = %e, "Failed to save license");
            return self.info(LicenseState::StorageFailed {
                reason: format!("Failed to save license: {}", e),
            });
        }

        info!(
            key_prefix = key.log_prefix(),
            tier = %record.payload.tier,
            founder = record.payload.is_founder,
            "License activated"
        );
        self.info(LicenseState::Active(ActiveLicense::from(&record)))
    }

    /// Recompute the license state from the local record. No network access.
    pub fn get_info(&self) -> LicenseInfo {
        let state = match self.store.load() {
            Ok(None) => LicenseState::Unactivated,
            Ok(Some(record)) => self.check_record(&record, self.clock.now()),
            Err(Error::Format(reason)) => {
                warn!(reason = %reason, "License file has an invalid shape");
                LicenseState::InvalidFormat { reason }
            }
            Err(e) => {
                warn!(error = %e, "License file is unreadable");
                LicenseState::Tampered {
                    reason: format!("Failed to read license file: {}", e),
                }
            }
        };

        debug!(state = state.name(), tier = %state.tier(), "License state computed");
        self.info(state)
    }

    /// Delete the local record. Idempotent.
    pub fn remove_license(&self) -> Result<()> {
        if self.store.remove()? {
            info!("License removed");
        } else {
            debug!("No license to remove");
        }
        Ok(())
    }

    fn check_record(&self, record: &SignedLicense, now: DateTime<Utc>) -> LicenseState {
        let key = match self.key_format.parse(&record.license_key) {
            Ok(key) => key,
            Err(e) => {
                warn!("License file holds a malformed key");
                return LicenseState::InvalidFormat {
                    reason: reason_of(e),
                };
            }
        };

        if record.payload.schema_version != PAYLOAD_SCHEMA_VERSION {
            warn!(
                key_prefix = key.log_prefix(),
                schema_version = record.payload.schema_version,
                "Unsupported license schema"
            );
            return LicenseState::InvalidFormat {
                reason: format!(
                    "Unsupported license schema version {}",
                    record.payload.schema_version
                ),
            };
        }

        if !verify(&record.payload, &record.signature, &self.secret) {
            warn!(key_prefix = key.log_prefix(), "License signature verification failed");
            return LicenseState::Tampered {
                reason: UNVERIFIED_LICENSE.to_string(),
            };
        }

        if !record.matches_payload() {
            warn!(key_prefix = key.log_prefix(), "License fields disagree with signed payload");
            return LicenseState::Tampered {
                reason: UNVERIFIED_LICENSE.to_string(),
            };
        }

        if let Some(expires_at) = record.payload.expires_at
            && expires_at <= now
        {
            warn!(key_prefix = key.log_prefix(), expires_at = %expires_at, "License has expired");
            return LicenseState::Expired {
                expired_at: expires_at,
            };
        }

        LicenseState::Active(ActiveLicense::from(record))
    }

    fn seal(
        &self,
        key: &LicenseKey,
        entry: &RegistryEntry,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedLicense> {
        let payload = LicensePayload {
            customer_id: entry.customer_id.clone(),
            tier: entry.tier,
            is_founder: entry.is_founder,
            email_hash: hash_email(email),
            issued_at: now,
            schema_version: PAYLOAD_SCHEMA_VERSION,
            expires_at: entry.expires,
        };
        let signature = sign(&payload, &self.secret)?;

        Ok(SignedLicense {
            tier: payload.tier,
            license_key: key.to_string(),
            email: email.trim().to_string(),
            expires: payload.expires_at,
            activated: now,
            customer_id: payload.customer_id.clone(),
            is_founder: payload.is_founder,
            payload,
            signature,
        })
    }

    fn info(&self, state: LicenseState) -> LicenseInfo {
        LicenseInfo::new(state, self.clock.now())
    }
}

fn email_matches(entry: &RegistryEntry, email: &str) -> bool {
    entry.email.trim().eq_ignore_ascii_case(email.trim())
}

fn reason_of(error: Error) -> String {
    match error {
        Error::Format(reason) => reason,
        other => other.to_string(),
    }
}
