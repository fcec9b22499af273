//! Deterministic serialization of license payloads.
//!
//! Canonical form is compact JSON with object keys sorted lexicographically
//! at every level, so the same payload always produces the same bytes no
//! matter how its fields were ordered when it was built or parsed.

use crate::types::LicensePayload;
use qaa_core::{Error, Result};
use serde_json::{Map, Value};

/// Payload schema this build signs and accepts.
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

/// Canonical bytes for a typed payload.
pub fn canonicalize(payload: &LicensePayload) -> Result<Vec<u8>> {
    if payload.schema_version != PAYLOAD_SCHEMA_VERSION {
        return Err(Error::Format(format!(
            "Unsupported payload schema version {} (expected {})",
            payload.schema_version, PAYLOAD_SCHEMA_VERSION
        )));
    }
    let value = serde_json::to_value(payload)?;
    canonical_json(&value)
}

/// Schema-validate a raw payload, then canonicalize it.
///
/// Unknown or missing fields are a [`Error::Format`]; they are never dropped.
pub fn canonicalize_value(value: &Value) -> Result<Vec<u8>> {
    let payload: LicensePayload = serde_json::from_value(value.clone())
        .map_err(|e| Error::Format(format!("Invalid license payload: {}", e)))?;
    canonicalize(&payload)
}

/// Compact JSON with sorted keys.
pub(crate) fn canonical_json(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&sorted(value))?)
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
