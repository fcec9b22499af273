//! HMAC-SHA256 signing of license payloads.

use crate::canonical::canonicalize;
use crate::types::LicensePayload;
use hmac::{Hmac, Mac};
use qaa_core::{Error, Result, SigningSecret};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Sign a payload. Returns the MAC as lowercase hex.
pub fn sign(payload: &LicensePayload, secret: &SigningSecret) -> Result<String> {
    let bytes = canonicalize(payload)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(&bytes);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature. Malformed input yields `false`, never an error.
///
/// The final comparison is constant-time.
pub fn verify(payload: &LicensePayload, signature: &str, secret: &SigningSecret) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let Ok(bytes) = canonicalize(payload) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(&bytes);
    mac.verify_slice(&expected).is_ok()
}

/// SHA-256 hex of the trimmed, lowercased email.
pub fn hash_email(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::PAYLOAD_SCHEMA_VERSION;
    use chrono::Utc;
    use qaa_core::Tier;

    fn secret() -> SigningSecret {
        SigningSecret::new("test-signing-secret").unwrap()
    }

    fn payload() -> LicensePayload {
        LicensePayload {
            customer_id: "cus_42".to_string(),
            tier: Tier::Team,
            is_founder: false,
            email_hash: hash_email("dev@example.com"),
            issued_at: Utc::now(),
            schema_version: PAYLOAD_SCHEMA_VERSION,
            expires_at: None,
        }
    }

    #[test]
    fn test_sign_verify() {
        let p = payload();
        let signature = sign(&p, &secret()).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify(&p, &signature, &secret()));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let p = payload();
        let signature = sign(&p, &secret()).unwrap();
        let other = SigningSecret::new("another-secret").unwrap();
        assert!(!verify(&p, &signature, &other));
    }

    #[test]
    fn test_malformed_signatures_are_false() {
        let p = payload();
        for bad in ["", "zz", "abc", "not-hex-at-all", "00"] {
            assert!(!verify(&p, bad, &secret()), "{:?}", bad);
        }
        let signature = sign(&p, &secret()).unwrap();
        assert!(!verify(&p, &signature[..62], &secret()));
        assert!(!verify(&p, &format!("{}00", signature), &secret()));
    }

    #[test]
    fn test_tier_change_fails() {
        let p = payload();
        let signature = sign(&p, &secret()).unwrap();
        let mut upgraded = p;
        upgraded.tier = Tier::Enterprise;
        assert!(!verify(&upgraded, &signature, &secret()));
    }

    #[test]
    fn test_unsupported_schema_does_not_verify() {
        let p = payload();
        let signature = sign(&p, &secret()).unwrap();
        let mut future = p;
        future.schema_version = PAYLOAD_SCHEMA_VERSION + 1;
        assert!(!verify(&future, &signature, &secret()));
        assert!(sign(&future, &secret()).is_err());
    }

    #[test]
    fn test_hash_email_normalizes() {
        assert_eq!(hash_email(" A@B.com "), hash_email("a@b.com"));
        assert_ne!(hash_email("a@b.com"), hash_email("a@c.com"));
        assert_eq!(hash_email("a@b.com").len(), 64);
    }
}
