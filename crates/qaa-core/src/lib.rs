//! qaa Core
//!
//! Shared vocabulary for qaa licensing: the error taxonomy, tiers, metered
//! operations, license key format, and the configuration struct.

pub mod config;
pub mod error;
pub mod key;
pub mod tier;

pub use config::{LicensingConfig, SigningSecret, UsageCaps};
pub use error::{Error, Result};
pub use key::{KeyFormat, LicenseKey};
pub use tier::{OperationKind, Tier};
