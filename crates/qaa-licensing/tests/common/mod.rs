//! Shared helpers for qaa-licensing integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use qaa_core::{Error, KeyFormat, LicensingConfig, Result, SigningSecret, Tier};
use qaa_licensing::{Registry, RegistryEntry, RegistrySource};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const FOUNDER_KEY: &str = "QAA-AAAA-BBBB-CCCC-DDDD";
pub const TEAM_KEY: &str = "QAA-TEAM-0000-1111-2222";
pub const SECRET: &str = "integration-test-secret";

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,qaa_licensing=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 20, 9, 30, 0).unwrap()
}

pub fn entry(tier: Tier, is_founder: bool, email: &str) -> RegistryEntry {
    RegistryEntry {
        customer_id: format!("cus_{}", tier),
        tier,
        is_founder,
        email: email.to_string(),
        subscription_id: Some(format!("sub_{}", tier)),
        added_date: fixed_now() - Duration::days(90),
        added_by: "stripe-webhook".to_string(),
        expires: None,
    }
}

/// The registry most tests run against: a PRO founder and a TEAM customer.
pub fn standard_registry() -> Registry {
    registry_with(vec![
        (FOUNDER_KEY, entry(Tier::Pro, true, "a@b.com")),
        (TEAM_KEY, entry(Tier::Team, false, "team@corp.example")),
    ])
}

pub fn registry_with(entries: Vec<(&str, RegistryEntry)>) -> Registry {
    let format = KeyFormat::new("QAA").unwrap();
    let mut registry = Registry::new("2026.05", fixed_now() - Duration::days(1))
        .with_description("qaa license registry");
    for (key, entry) in entries {
        registry.insert(format.parse(key).unwrap(), entry);
    }
    registry
}

pub fn document_bytes(registry: &Registry) -> Vec<u8> {
    serde_json::to_vec_pretty(&registry.to_document().unwrap()).unwrap()
}

pub fn config(dir: &Path) -> LicensingConfig {
    LicensingConfig::new(SigningSecret::new(SECRET).unwrap(), dir)
        .with_registry_timeout(std::time::Duration::from_millis(300))
}

/// Serves a fixed document, or fails like an unreachable network when `None`.
pub struct StubSource {
    document: Option<Vec<u8>>,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn serving(document: Vec<u8>) -> Self {
        Self {
            document: Some(document),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn offline() -> Self {
        Self {
            document: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrySource for StubSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.document
            .clone()
            .ok_or_else(|| Error::Network("network unreachable".to_string()))
    }

    fn location(&self) -> &str {
        "stub"
    }
}
