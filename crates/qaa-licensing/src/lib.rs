//! License validation and signing for qaa.
//!
//! Activation checks a key against the vendor registry and writes an
//! HMAC-signed record to the state directory. Validation re-verifies that
//! record offline. Any failure resolves to the free tier.

pub mod canonical;
pub mod clock;
pub mod features;
mod fs;
pub mod registry;
pub mod service;
pub mod signing;
pub mod store;
pub mod types;
pub mod usage;
pub mod validator;

pub use canonical::{PAYLOAD_SCHEMA_VERSION, canonicalize, canonicalize_value};
pub use clock::{Clock, FixedClock, SystemClock};
pub use features::{Feature, features_for_tier, has_feature, tier_allows};
pub use registry::{
    HttpRegistrySource, Registry, RegistryEntry, RegistryLoader, RegistryMetadata,
    RegistrySource,
};
pub use service::LicenseService;
pub use signing::{hash_email, sign, verify};
pub use store::LocalLicenseStore;
pub use types::{
    ActiveLicense, LicenseInfo, LicensePayload, LicenseState, SignedLicense, UNVERIFIED_LICENSE,
};
pub use usage::{CapCheck, UsageRecord, UsageTracker};
pub use validator::LicenseValidator;
