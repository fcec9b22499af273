//! License registry: document format, integrity checks, and loading.
//!
//! A registry document is a JSON object whose `_metadata` member describes the
//! document and whose every other member maps a license key to an entry. The
//! metadata checksum is the SHA-256 of the canonical JSON of the entries only.
//! A document that fails any check is rejected as a whole.

use crate::canonical::canonical_json;
use crate::fs::{read_optional, write_atomic};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use qaa_core::{Error, KeyFormat, LicenseKey, LicensingConfig, Result, Tier};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the metadata member in a registry document.
pub const METADATA_KEY: &str = "_metadata";

const USER_AGENT_VALUE: &str = concat!("qaa-licensing/", env!("CARGO_PKG_VERSION"));

/// Entitlement record for one license key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegistryEntry {
    pub customer_id: String,
    pub tier: Tier,
    pub is_founder: bool,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    pub added_date: DateTime<Utc>,
    pub added_by: String,
    /// End of the paid period, if the license is time-limited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

/// Registry document metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryMetadata {
    pub version: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// SHA-256 hex over the canonical entries.
    pub checksum: String,
    /// Base64 Ed25519 signature over the checksum string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A trusted set of registry entries.
///
/// An empty registry entitles nothing.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<LicenseKey, RegistryEntry>,
    metadata: Option<RegistryMetadata>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start a new registry for publishing.
    pub fn new(version: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            entries: BTreeMap::new(),
            metadata: Some(RegistryMetadata {
                version: version.into(),
                created,
                description: None,
                checksum: String::new(),
                signature: None,
            }),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        if let Some(metadata) = self.metadata.as_mut() {
            metadata.description = Some(description.into());
        }
        self
    }

    pub fn insert(&mut self, key: LicenseKey, entry: RegistryEntry) -> Option<RegistryEntry> {
        self.entries.insert(key, entry)
    }

    pub fn lookup(&self, key: &LicenseKey) -> Option<&RegistryEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metadata(&self) -> Option<&RegistryMetadata> {
        self.metadata.as_ref()
    }

    pub fn keys(&self) -> impl Iterator<Item = &LicenseKey> {
        self.entries.keys()
    }

    /// Checksum of the current entries.
    pub fn checksum(&self) -> Result<String> {
        checksum_hex(&self.entries_map()?)
    }

    /// Sign the current checksum with the vendor's Ed25519 key.
    pub fn sign(&mut self, signing_key: &SigningKey) -> Result<()> {
        let checksum = self.checksum()?;
        let metadata = self
            .metadata
            .as_mut()
            .ok_or_else(|| Error::Internal("Registry has no metadata".to_string()))?;

        let signature = signing_key.sign(checksum.as_bytes());
        metadata.signature =
            Some(base64::engine::general_purpose::STANDARD.encode(signature.to_bytes()));
        metadata.checksum = checksum;
        Ok(())
    }

    /// Render the registry as a document, with the checksum recomputed.
    pub fn to_document(&self) -> Result<Value> {
        let mut metadata = self
            .metadata
            .clone()
            .ok_or_else(|| Error::Internal("Registry has no metadata".to_string()))?;

        let mut document = self.entries_map()?;
        metadata.checksum = checksum_hex(&document)?;
        document.insert(METADATA_KEY.to_string(), serde_json::to_value(&metadata)?);
        Ok(Value::Object(document))
    }

    /// Parse and check a registry document.
    ///
    /// Fails with [`Error::RegistryIntegrity`] on anything untrustworthy: bad
    /// JSON, missing metadata, checksum mismatch, a missing or invalid
    /// signature when `verifying_key` is given, a malformed key, or a
    /// malformed entry.
    pub fn from_document(
        raw: &[u8],
        key_format: &KeyFormat,
        verifying_key: Option<&VerifyingKey>,
    ) -> Result<Self> {
        let document: Value = serde_json::from_slice(raw).map_err(|e| {
            Error::RegistryIntegrity(format!("Registry is not valid JSON: {}", e))
        })?;

        let Value::Object(mut members) = document else {
            return Err(Error::RegistryIntegrity(
                "Registry document is not an object".to_string(),
            ));
        };

        let metadata_value = members.remove(METADATA_KEY).ok_or_else(|| {
            Error::RegistryIntegrity("Registry metadata missing".to_string())
        })?;
        let metadata: RegistryMetadata = serde_json::from_value(metadata_value).map_err(|e| {
            Error::RegistryIntegrity(format!("Invalid registry metadata: {}", e))
        })?;

        let checksum = checksum_hex(&members)?;
        if !checksum.eq_ignore_ascii_case(&metadata.checksum) {
            return Err(Error::RegistryIntegrity("Registry checksum mismatch".to_string()));
        }

        if let Some(key) = verifying_key {
            verify_checksum_signature(&metadata, key)?;
        }

        let mut entries = BTreeMap::new();
        for (raw_key, value) in members {
            let key = key_format.parse(&raw_key).map_err(|_| {
                Error::RegistryIntegrity("Registry contains a malformed license key".to_string())
            })?;
            let entry: RegistryEntry = serde_json::from_value(value).map_err(|e| {
                Error::RegistryIntegrity(format!(
                    "Invalid registry entry for {}: {}",
                    key.log_prefix(),
                    e
                ))
            })?;
            entries.insert(key, entry);
        }

        Ok(Self {
            entries,
            metadata: Some(metadata),
        })
    }

    fn entries_map(&self) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        for (key, entry) in &self.entries {
            map.insert(key.to_string(), serde_json::to_value(entry)?);
        }
        Ok(map)
    }
}

/// SHA-256 hex of the canonical JSON of `entries`.
pub fn checksum_hex(entries: &Map<String, Value>) -> Result<String> {
    let bytes = canonical_json(&Value::Object(entries.clone()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Decode a base64 Ed25519 public key.
pub fn decode_verifying_key(encoded: &str) -> Result<VerifyingKey> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Config(format!("Invalid registry public key: {}", e)))?;

    let key_bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::Config("Registry public key must be 32 bytes".to_string()))?;

    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| Error::Config(format!("Invalid registry public key: {}", e)))
}

fn verify_checksum_signature(metadata: &RegistryMetadata, key: &VerifyingKey) -> Result<()> {
    let encoded = metadata
        .signature
        .as_deref()
        .ok_or_else(|| Error::RegistryIntegrity("Registry signature missing".to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| Error::RegistryIntegrity("Registry signature is malformed".to_string()))?;

    let sig_bytes: [u8; 64] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::RegistryIntegrity("Registry signature is malformed".to_string()))?;

    key.verify(metadata.checksum.as_bytes(), &Signature::from_bytes(&sig_bytes))
        .map_err(|_| Error::RegistryIntegrity("Registry signature is invalid".to_string()))
}

/// Where registry documents come from.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Fetch the raw document bytes.
    async fn fetch(&self) -> Result<Vec<u8>>;

    /// Human-readable location, for logs.
    fn location(&self) -> &str;
}

/// Fetches the registry document over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRegistrySource {
    client: reqwest::Client,
    url: String,
}

impl HttpRegistrySource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RegistrySource for HttpRegistrySource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        debug!(url = %self.url, "Fetching license registry");

        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "Registry returned error: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read registry body: {}", e)))?;

        Ok(bytes.to_vec())
    }

    fn location(&self) -> &str {
        &self.url
    }
}

/// Resolves a trusted registry: network first, then the disk cache, then empty.
pub struct RegistryLoader {
    source: Arc<dyn RegistrySource>,
    cache_path: PathBuf,
    timeout: Duration,
    key_format: KeyFormat,
    verifying_key: Option<VerifyingKey>,
}

impl RegistryLoader {
    /// Fails if the configured key prefix or registry public key is invalid.
    pub fn new(source: Arc<dyn RegistrySource>, config: &LicensingConfig) -> Result<Self> {
        let verifying_key = config
            .registry_public_key
            .as_deref()
            .map(decode_verifying_key)
            .transpose()?;

        Ok(Self {
            source,
            cache_path: config.registry_cache_path(),
            timeout: config.registry_timeout,
            key_format: KeyFormat::new(&config.key_prefix)?,
            verifying_key,
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Load the registry. Never fails: with no trustworthy source the result
    /// is an empty registry.
    pub async fn load(&self) -> Registry {
        match self.load_remote().await {
            Ok((registry, raw)) => {
                info!(
                    source = self.source.location(),
                    entries = registry.len(),
                    "License registry fetched"
                );
                if let Err(e) = self.write_cache(raw).await {
                    warn!(error = %e, "Failed to update registry cache");
                }
                return registry;
            }
            Err(e) => {
                warn!(
                    source = self.source.location(),
                    error = %e,
                    "Registry fetch failed, falling back to cache"
                );
            }
        }

        match self.load_cached() {
            Ok(Some(registry)) => {
                info!(entries = registry.len(), "Using cached license registry");
                registry
            }
            Ok(None) => {
                warn!("No cached license registry; nothing is entitled");
                Registry::empty()
            }
            Err(e) => {
                warn!(error = %e, "Cached license registry rejected; nothing is entitled");
                Registry::empty()
            }
        }
    }

    /// Load the last-known-good cached registry, with the same checks as a fetch.
    pub fn load_cached(&self) -> Result<Option<Registry>> {
        let Some(raw) = read_optional(&self.cache_path)? else {
            return Ok(None);
        };
        Registry::from_document(&raw, &self.key_format, self.verifying_key.as_ref()).map(Some)
    }

    async fn load_remote(&self) -> Result<(Registry, Vec<u8>)> {
        let raw = tokio::time::timeout(self.timeout, self.source.fetch())
            .await
            .map_err(|_| {
                Error::Network(format!("Registry fetch timed out after {:?}", self.timeout))
            })??;

        let registry =
            Registry::from_document(&raw, &self.key_format, self.verifying_key.as_ref())?;
        Ok((registry, raw))
    }

    async fn write_cache(&self, raw: Vec<u8>) -> Result<()> {
        let path = self.cache_path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &raw))
            .await
            .map_err(|e| Error::Internal(format!("Cache write task failed: {}", e)))??;
        debug!(path = %self.cache_path.display(), "Registry cache updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use qaa_core::SigningSecret;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(tier: Tier, email: &str) -> RegistryEntry {
        RegistryEntry {
            customer_id: "cus_1".to_string(),
            tier,
            is_founder: false,
            email: email.to_string(),
            subscription_id: Some("sub_1".to_string()),
            added_date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            added_by: "admin".to_string(),
            expires: None,
        }
    }

    fn format() -> KeyFormat {
        KeyFormat::new("QAA").unwrap()
    }

    fn sample_registry() -> Registry {
        let mut registry = Registry::new("1.0", Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        registry.insert(
            format().parse("QAA-AAAA-BBBB-CCCC-DDDD").unwrap(),
            entry(Tier::Pro, "a@b.com"),
        );
        registry.insert(
            format().parse("QAA-1111-2222-3333-4444").unwrap(),
            entry(Tier::Team, "team@b.com"),
        );
        registry
    }

    fn document_bytes(document: &Value) -> Vec<u8> {
        serde_json::to_vec_pretty(document).unwrap()
    }

    /// Serves canned responses and counts calls.
    struct StaticSource {
        response: std::result::Result<Vec<u8>, String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn ok(bytes: Vec<u8>) -> Self {
            Self {
                response: Ok(bytes),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err("connection refused".to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RegistrySource for StaticSource {
        async fn fetch(&self) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone().map_err(Error::Network)
        }

        fn location(&self) -> &str {
            "static"
        }
    }

    fn config(dir: &Path) -> LicensingConfig {
        LicensingConfig::new(SigningSecret::new("secret").unwrap(), dir)
            .with_registry_timeout(Duration::from_millis(200))
    }

    #[test]
    fn test_document_roundtrip_passes_integrity() {
        let registry = sample_registry();
        let bytes = document_bytes(&registry.to_document().unwrap());
        let parsed = Registry::from_document(&bytes, &format(), None).unwrap();

        assert_eq!(parsed.len(), 2);
        let key = format().parse("QAA-AAAA-BBBB-CCCC-DDDD").unwrap();
        assert_eq!(parsed.lookup(&key).unwrap().tier, Tier::Pro);
        assert_eq!(
            parsed.metadata().unwrap().checksum,
            registry.checksum().unwrap()
        );
    }

    #[test]
    fn test_checksum_ignores_metadata() {
        let registry = sample_registry();
        let mut document = registry.to_document().unwrap();
        document[METADATA_KEY]["description"] = Value::String("edited".to_string());
        document[METADATA_KEY]["version"] = Value::String("9.9".to_string());

        let parsed = Registry::from_document(&document_bytes(&document), &format(), None).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_edited_entry_discards_whole_registry() {
        let mut document = sample_registry().to_document().unwrap();
        document["QAA-1111-2222-3333-4444"]["tier"] = Value::String("enterprise".to_string());

        let result = Registry::from_document(&document_bytes(&document), &format(), None);
        assert!(matches!(result, Err(Error::RegistryIntegrity(_))));
    }

    #[test]
    fn test_added_entry_discards_whole_registry() {
        let mut document = sample_registry().to_document().unwrap();
        document["QAA-ZZZZ-ZZZZ-ZZZZ-ZZZZ"] =
            serde_json::to_value(entry(Tier::Enterprise, "evil@x.com")).unwrap();

        let result = Registry::from_document(&document_bytes(&document), &format(), None);
        assert!(matches!(result, Err(Error::RegistryIntegrity(_))));
    }

    #[test]
    fn test_malformed_entry_rejected_even_with_matching_checksum() {
        let mut document = sample_registry().to_document().unwrap();
        document["QAA-1111-2222-3333-4444"]["surprise"] = Value::Bool(true);
        let members: Map<String, Value> = document
            .as_object()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.as_str() != METADATA_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        document[METADATA_KEY]["checksum"] = Value::String(checksum_hex(&members).unwrap());

        let result = Registry::from_document(&document_bytes(&document), &format(), None);
        assert!(matches!(result, Err(Error::RegistryIntegrity(_))));
    }

    #[test]
    fn test_missing_metadata_and_garbage_rejected() {
        let result = Registry::from_document(b"{}", &format(), None);
        assert!(matches!(result, Err(Error::RegistryIntegrity(_))));

        let result = Registry::from_document(b"[1,2,3]", &format(), None);
        assert!(matches!(result, Err(Error::RegistryIntegrity(_))));

        let result = Registry::from_document(b"<html>", &format(), None);
        assert!(matches!(result, Err(Error::RegistryIntegrity(_))));
    }

    #[test]
    fn test_signed_registry() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying_key = signing_key.verifying_key();

        let mut registry = sample_registry();
        registry.sign(&signing_key).unwrap();
        let bytes = document_bytes(&registry.to_document().unwrap());

        assert!(Registry::from_document(&bytes, &format(), Some(&verifying_key)).is_ok());

        let other = SigningKey::from_bytes(&[8u8; 32]).verifying_key();
        let result = Registry::from_document(&bytes, &format(), Some(&other));
        assert!(matches!(result, Err(Error::RegistryIntegrity(_))));

        let unsigned = document_bytes(&sample_registry().to_document().unwrap());
        let result = Registry::from_document(&unsigned, &format(), Some(&verifying_key));
        assert!(matches!(result, Err(Error::RegistryIntegrity(_))));
    }

    #[test]
    fn test_decode_verifying_key() {
        let key = SigningKey::from_bytes(&[3u8; 32]).verifying_key();
        let encoded = base64::engine::general_purpose::STANDARD.encode(key.to_bytes());
        assert_eq!(decode_verifying_key(&encoded).unwrap(), key);

        assert!(matches!(decode_verifying_key("!!!"), Err(Error::Config(_))));
        assert!(matches!(decode_verifying_key("AAAA"), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_loader_fetch_updates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = document_bytes(&sample_registry().to_document().unwrap());
        let loader =
            RegistryLoader::new(Arc::new(StaticSource::ok(bytes.clone())), &config(dir.path()))
                .unwrap();

        let registry = loader.load().await;
        assert_eq!(registry.len(), 2);
        assert_eq!(std::fs::read(loader.cache_path()).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_loader_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let bytes = document_bytes(&sample_registry().to_document().unwrap());
        std::fs::write(cfg.registry_cache_path(), &bytes).unwrap();

        let source = Arc::new(StaticSource::failing());
        let loader = RegistryLoader::new(source.clone(), &cfg).unwrap();

        let registry = loader.load().await;
        assert_eq!(registry.len(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loader_corrupt_fetch_does_not_overwrite_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let good = document_bytes(&sample_registry().to_document().unwrap());
        std::fs::write(cfg.registry_cache_path(), &good).unwrap();

        let mut corrupt = sample_registry().to_document().unwrap();
        corrupt[METADATA_KEY]["checksum"] = Value::String("0".repeat(64));
        let loader = RegistryLoader::new(
            Arc::new(StaticSource::ok(document_bytes(&corrupt))),
            &cfg,
        )
        .unwrap();

        let registry = loader.load().await;
        assert_eq!(registry.len(), 2);
        assert_eq!(std::fs::read(cfg.registry_cache_path()).unwrap(), good);
    }

    #[tokio::test]
    async fn test_loader_timeout_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = document_bytes(&sample_registry().to_document().unwrap());
        let source = StaticSource {
            response: Ok(bytes),
            delay: Some(Duration::from_secs(5)),
            calls: AtomicUsize::new(0),
        };
        let loader = RegistryLoader::new(Arc::new(source), &config(dir.path())).unwrap();

        let registry = loader.load().await;
        assert!(registry.is_empty());
        assert!(!loader.cache_path().exists());
    }

    #[tokio::test]
    async fn test_loader_corrupt_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let mut document = sample_registry().to_document().unwrap();
        document["QAA-AAAA-BBBB-CCCC-DDDD"]["tier"] = Value::String("enterprise".to_string());
        std::fs::write(cfg.registry_cache_path(), document_bytes(&document)).unwrap();

        let loader = RegistryLoader::new(Arc::new(StaticSource::failing()), &cfg).unwrap();
        assert!(loader.load().await.is_empty());
    }

    #[test]
    fn test_loader_rejects_bad_public_key() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path()).with_registry_public_key("not base64!");
        let result = RegistryLoader::new(Arc::new(StaticSource::failing()), &cfg);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
