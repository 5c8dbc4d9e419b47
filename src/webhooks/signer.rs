//! HMAC-SHA256 webhook signing and verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid secret key length")]
    InvalidKeyLength,
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct WebhookSigner {
    secret: Vec<u8>,
}

impl WebhookSigner {
    pub fn new(secret: &str) -> Self {
        Self { secret: secret.as_bytes().to_vec() }
    }

    /// Signs the canonical JSON encoding of `payload` — keys sorted
    /// recursively, no extraneous whitespace — and returns a lowercase
    /// hex digest.
    pub fn sign(&self, payload: &serde_json::Value) -> Result<String, SignerError> {
        let canonical = canonicalize(payload);
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| SignerError::InvalidKeyLength)?;
        mac.update(canonical.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Accepts a signature with or without the `sha256=` prefix and
    /// compares in constant time (the `hmac` crate's own tag comparison).
    pub fn verify(&self, payload: &serde_json::Value, signature: &str) -> Result<bool, SignerError> {
        let stripped = signature.strip_prefix("sha256=").unwrap_or(signature);
        let canonical = canonicalize(payload);
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| SignerError::InvalidKeyLength)?;
        mac.update(canonical.as_bytes());

        let Ok(expected_bytes) = hex::decode(stripped) else { return Ok(false) };
        Ok(mac.verify_slice(&expected_bytes).is_ok())
    }

    pub fn signature_header(&self, payload: &serde_json::Value) -> Result<(&'static str, String), SignerError> {
        let signature = self.sign(payload)?;
        Ok(("X-Webhook-Signature", format!("sha256={signature}")))
    }
}

/// Serializes `value` with object keys sorted recursively, matching
/// `json.dumps(..., sort_keys=True, separators=(",", ":"))` upstream.
fn canonicalize(value: &serde_json::Value) -> String {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut sorted = std::collections::BTreeMap::new();
                for (k, v) in map {
                    sorted.insert(k.clone(), sort(v));
                }
                let mut ordered = serde_json::Map::new();
                for (k, v) in sorted {
                    ordered.insert(k, v);
                }
                serde_json::Value::Object(ordered)
            }
            serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(value)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sign_is_deterministic_regardless_of_key_order() {
        let signer = WebhookSigner::new("webhook_secret_key");
        let a = json!({"event": "trade.created", "data": {"id": 1, "amount": 100}});
        let b = json!({"data": {"amount": 100, "id": 1}, "event": "trade.created"});
        assert_eq!(signer.sign(&a).unwrap(), signer.sign(&b).unwrap());
    }

    #[test]
    fn verify_accepts_prefixed_and_bare_signature() {
        let signer = WebhookSigner::new("webhook_secret_key");
        let payload = json!({"event": "trade.created"});
        let signature = signer.sign(&payload).unwrap();
        assert!(signer.verify(&payload, &signature).unwrap());
        assert!(signer.verify(&payload, &format!("sha256={signature}")).unwrap());
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let signer = WebhookSigner::new("webhook_secret_key");
        let payload = json!({"event": "trade.created"});
        let signature = signer.sign(&payload).unwrap();
        let tampered = json!({"event": "trade.cancelled"});
        assert!(!signer.verify(&tampered, &signature).unwrap());
    }

    #[test]
    fn signature_header_has_expected_shape() {
        let signer = WebhookSigner::new("webhook_secret_key");
        let payload = json!({"event": "trade.created"});
        let (name, value) = signer.signature_header(&payload).unwrap();
        assert_eq!(name, "X-Webhook-Signature");
        assert!(value.starts_with("sha256="));
    }
}
