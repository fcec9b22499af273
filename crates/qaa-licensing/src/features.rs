//! Tier-gated features.
//!
//! Free: basic scaffolding
//! Starter: env validation, custom templates
//! Pro: framework grouping, unlimited pre-push, dependency automation
//! Team: team policies, shared configs
//! Enterprise: audit log, SSO enforcement

use qaa_core::Tier;
use serde::{Deserialize, Serialize};

/// Every gated feature. Each tier includes the features of the tiers below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    // Free
    BasicScaffolding,

    // Starter
    EnvValidation,
    CustomTemplates,

    // Pro
    FrameworkGrouping,
    UnlimitedPrePush,
    DependencyAutomation,

    // Team
    TeamPolicies,
    SharedConfigs,

    // Enterprise
    AuditLog,
    SsoEnforcement,
}

impl Feature {
    pub const ALL: [Feature; 10] = [
        Self::BasicScaffolding,
        Self::EnvValidation,
        Self::CustomTemplates,
        Self::FrameworkGrouping,
        Self::UnlimitedPrePush,
        Self::DependencyAutomation,
        Self::TeamPolicies,
        Self::SharedConfigs,
        Self::AuditLog,
        Self::SsoEnforcement,
    ];

    /// Minimum tier required for this feature.
    pub fn min_tier(&self) -> Tier {
        match self {
            Self::BasicScaffolding => Tier::Free,
            Self::EnvValidation | Self::CustomTemplates => Tier::Starter,
            Self::FrameworkGrouping | Self::UnlimitedPrePush | Self::DependencyAutomation => {
                Tier::Pro
            }
            Self::TeamPolicies | Self::SharedConfigs => Tier::Team,
            Self::AuditLog | Self::SsoEnforcement => Tier::Enterprise,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasicScaffolding => "basicScaffolding",
            Self::EnvValidation => "envValidation",
            Self::CustomTemplates => "customTemplates",
            Self::FrameworkGrouping => "frameworkGrouping",
            Self::UnlimitedPrePush => "unlimitedPrePush",
            Self::DependencyAutomation => "dependencyAutomation",
            Self::TeamPolicies => "teamPolicies",
            Self::SharedConfigs => "sharedConfigs",
            Self::AuditLog => "auditLog",
            Self::SsoEnforcement => "ssoEnforcement",
        }
    }

    /// Exact, case-sensitive match on the feature name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    /// Human-readable description for upgrade messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::BasicScaffolding => "Project scaffolding and default checks",
            Self::EnvValidation => "Environment variable validation",
            Self::CustomTemplates => "Custom project templates",
            Self::FrameworkGrouping => "Test grouping by framework",
            Self::UnlimitedPrePush => "Unlimited pre-push runs",
            Self::DependencyAutomation => "Automated dependency update PRs",
            Self::TeamPolicies => "Team-wide policy enforcement",
            Self::SharedConfigs => "Shared configuration across repositories",
            Self::AuditLog => "Audit log of license and policy events",
            Self::SsoEnforcement => "SSO enforcement",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if a tier grants access to a feature.
pub fn tier_allows(tier: Tier, feature: Feature) -> bool {
    tier >= feature.min_tier()
}

/// Check a feature by name. Unknown names are never granted.
pub fn has_feature(tier: Tier, name: &str) -> bool {
    Feature::parse(name).is_some_and(|feature| tier_allows(tier, feature))
}

/// All features a tier grants.
pub fn features_for_tier(tier: Tier) -> Vec<Feature> {
    Feature::ALL
        .into_iter()
        .filter(|f| tier_allows(tier, *f))
        .collect()
}
