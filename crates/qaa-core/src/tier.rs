//! License tiers and metered operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entitlement level, ordered by feature richness.
///
/// The ordering says nothing about usage caps: only [`Tier::Free`] is capped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    #[serde(alias = "FREE")]
    Free,
    #[serde(alias = "STARTER")]
    Starter,
    #[serde(alias = "PRO")]
    Pro,
    #[serde(alias = "TEAM")]
    Team,
    #[serde(alias = "ENTERPRISE")]
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Self::Free,
        Self::Starter,
        Self::Pro,
        Self::Team,
        Self::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Team => "team",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parse a tier name, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "starter" => Some(Self::Starter),
            "pro" => Some(Self::Pro),
            "team" => Some(Self::Team),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    /// Whether this tier pays for the product. Paid tiers are never capped.
    pub fn is_paid(&self) -> bool {
        *self != Self::Free
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metered operation counted against the free tier's monthly caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// A pre-push hook run.
    PrePush,
    /// An automated dependency pull request.
    DependencyPr,
}

impl OperationKind {
    pub const ALL: [OperationKind; 2] = [Self::PrePush, Self::DependencyPr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrePush => "pre-push",
            Self::DependencyPr => "dependency-pr",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pre-push" => Some(Self::PrePush),
            "dependency-pr" => Some(Self::DependencyPr),
            _ => None,
        }
    }

    /// Human-readable plural used in cap messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PrePush => "pre-push runs",
            Self::DependencyPr => "dependency PRs",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
