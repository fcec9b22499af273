//! License types and structures.

use crate::signing::hash_email;
use chrono::{DateTime, Utc};
use qaa_core::{Error, Result, Tier};
use serde::{Deserialize, Serialize};

/// Message shared by "key not in registry" and "signature did not verify",
/// so callers cannot tell the two apart.
pub const UNVERIFIED_LICENSE: &str = "License verification failed";

/// The signed part of a license record. Immutable once signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LicensePayload {
    pub customer_id: String,
    pub tier: Tier,
    pub is_founder: bool,
    /// SHA-256 hex of the normalized email.
    pub email_hash: String,
    pub issued_at: DateTime<Utc>,
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// This machine's activated license, as stored in `license.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignedLicense {
    pub tier: Tier,
    pub license_key: String,
    pub email: String,
    pub expires: Option<DateTime<Utc>>,
    pub activated: DateTime<Utc>,
    pub customer_id: String,
    pub is_founder: bool,
    pub payload: LicensePayload,
    /// HMAC-SHA256 over the canonical payload, lowercase hex.
    pub signature: String,
}

impl SignedLicense {
    /// Whether the unsigned top-level fields agree with the signed payload.
    pub fn matches_payload(&self) -> bool {
        self.tier == self.payload.tier
            && self.is_founder == self.payload.is_founder
            && self.customer_id == self.payload.customer_id
            && self.expires == self.payload.expires_at
            && hash_email(&self.email) == self.payload.email_hash
    }
}

/// A verified, unexpired license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLicense {
    pub tier: Tier,
    pub email: String,
    pub is_founder: bool,
    pub license_key: String,
    pub customer_id: String,
    pub activated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&SignedLicense> for ActiveLicense {
    fn from(record: &SignedLicense) -> Self {
        Self {
            tier: record.payload.tier,
            email: record.email.clone(),
            is_founder: record.payload.is_founder,
            license_key: record.license_key.clone(),
            customer_id: record.payload.customer_id.clone(),
            activated_at: record.activated,
            expires_at: record.payload.expires_at,
        }
    }
}

/// Outcome of activation or validation.
///
/// Every variant except [`LicenseState::Active`] resolves to [`Tier::Free`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseState {
    /// No local record. The default, not a failure.
    Unactivated,
    Active(ActiveLicense),
    Expired { expired_at: DateTime<Utc> },
    /// Unreadable record, bad signature, or fields that disagree with the payload.
    Tampered { reason: String },
    /// Malformed key or record.
    InvalidFormat { reason: String },
    /// Well-formed key that the registry does not entitle.
    NotEntitled,
    /// Activation succeeded but the record could not be written.
    StorageFailed { reason: String },
}

impl LicenseState {
    pub fn tier(&self) -> Tier {
        match self {
            Self::Active(license) => license.tier,
            _ => Tier::Free,
        }
    }

    /// `Unactivated` counts as valid: it is the free tier working as intended.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Unactivated | Self::Active(_))
    }

    pub fn error(&self) -> Option<String> {
        match self {
            Self::Unactivated | Self::Active(_) => None,
            Self::Expired { .. } => Some("License expired".to_string()),
            Self::Tampered { reason }
            | Self::InvalidFormat { reason }
            | Self::StorageFailed { reason } => Some(reason.clone()),
            Self::NotEntitled => Some(UNVERIFIED_LICENSE.to_string()),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unactivated => "unactivated",
            Self::Active(_) => "active",
            Self::Expired { .. } => "expired",
            Self::Tampered { .. } => "tampered",
            Self::InvalidFormat { .. } => "invalid_format",
            Self::NotEntitled => "not_entitled",
            Self::StorageFailed { .. } => "storage_failed",
        }
    }
}

/// License information handed to calling code.
#[derive(Debug, Clone)]
pub struct LicenseInfo {
    pub state: LicenseState,
    pub checked_at: DateTime<Utc>,
}

impl LicenseInfo {
    pub fn new(state: LicenseState, checked_at: DateTime<Utc>) -> Self {
        Self { state, checked_at }
    }

    pub fn tier(&self) -> Tier {
        self.state.tier()
    }

    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    pub fn error(&self) -> Option<String> {
        self.state.error()
    }

    pub fn active(&self) -> Option<&ActiveLicense> {
        match &self.state {
            LicenseState::Active(license) => Some(license),
            _ => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.active().map(|l| l.email.as_str())
    }

    pub fn is_founder(&self) -> bool {
        self.active().is_some_and(|l| l.is_founder)
    }

    /// The active license, or the failure as an [`Error`] for `?` callers.
    pub fn require_active(&self) -> Result<&ActiveLicense> {
        match &self.state {
            LicenseState::Active(license) => Ok(license),
            LicenseState::Unactivated | LicenseState::NotEntitled => Err(Error::NotEntitled),
            LicenseState::Expired { .. } => Err(Error::Expired),
            LicenseState::Tampered { .. } => Err(Error::Signature),
            LicenseState::InvalidFormat { reason } => Err(Error::Format(reason.clone())),
            LicenseState::StorageFailed { reason } => Err(Error::Internal(reason.clone())),
        }
    }
}
