//! Monthly usage counters and free-tier caps.

use crate::clock::Clock;
use crate::fs::{read_optional, write_atomic};
use qaa_core::{LicensingConfig, OperationKind, Result, Tier, UsageCaps};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters for one calendar month, as stored in `usage.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsageRecord {
    /// `YYYY-MM`, UTC.
    pub month: String,
    #[serde(default)]
    pub counters: BTreeMap<OperationKind, u64>,
}

impl UsageRecord {
    pub fn new(month: impl Into<String>) -> Self {
        Self {
            month: month.into(),
            counters: BTreeMap::new(),
        }
    }

    pub fn count(&self, kind: OperationKind) -> u64 {
        self.counters.get(&kind).copied().unwrap_or(0)
    }
}

/// Result of a cap check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapCheck {
    pub allowed: bool,
    /// `None` means unlimited.
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
    /// Set when the operation is denied.
    pub reason: Option<String>,
}

impl CapCheck {
    pub fn unlimited() -> Self {
        Self {
            allowed: true,
            remaining: None,
            limit: None,
            reason: None,
        }
    }
}

/// Tracks metered operations per month.
pub struct UsageTracker {
    path: PathBuf,
    caps: UsageCaps,
    clock: Arc<dyn Clock>,
}

impl UsageTracker {
    pub fn new(path: impl Into<PathBuf>, caps: UsageCaps, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            caps,
            clock,
        }
    }

    pub fn from_config(config: &LicensingConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.usage_path(), config.caps, clock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `kind` may run once more this month.
    ///
    /// Paid tiers are always allowed and never touch the counters.
    pub fn check_cap(&self, tier: Tier, kind: OperationKind) -> CapCheck {
        if tier.is_paid() {
            return CapCheck::unlimited();
        }

        let limit = self.caps.limit_for(kind);
        let used = self.usage().count(kind);
        let remaining = limit.saturating_sub(used);

        if used >= limit {
            debug!(operation = %kind, used, limit, "Free-tier cap reached");
            return CapCheck {
                allowed: false,
                remaining: Some(0),
                limit: Some(limit),
                reason: Some(format!(
                    "Free tier limit reached: {} of {} {} used this month. Upgrade for unlimited {}.",
                    used,
                    limit,
                    kind.label(),
                    kind.label()
                )),
            };
        }

        CapCheck {
            allowed: true,
            remaining: Some(remaining),
            limit: Some(limit),
            reason: None,
        }
    }

    /// Count one run of `kind` and return the new monthly count.
    pub fn increment_usage(&self, tier: Tier, kind: OperationKind) -> Result<u64> {
        let mut record = self.usage();
        let count = record.counters.entry(kind).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;

        write_atomic(&self.path, &serde_json::to_vec_pretty(&record)?)?;
        debug!(operation = %kind, tier = %tier, count, month = %record.month, "Usage recorded");
        Ok(count)
    }

    /// Counters for the current month. A record from an earlier month reads as zero.
    pub fn usage(&self) -> UsageRecord {
        let month = self.current_month();
        let record = match self.load() {
            Some(record) => record,
            None => return UsageRecord::new(month),
        };

        if record.month != month {
            debug!(from = %record.month, to = %month, "Usage month rolled over");
            return UsageRecord::new(month);
        }
        record
    }

    fn load(&self) -> Option<UsageRecord> {
        let bytes = match read_optional(&self.path) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(error = %e, "Usage file unreadable, starting fresh");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Usage file corrupt, starting fresh");
                None
            }
        }
    }

    fn current_month(&self) -> String {
        self.clock.now().format("%Y-%m").to_string()
    }
}
