// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Privy request authorization signatures.
//!
//! Wallet requests carry a `privy-authorization-signature` header: an ECDSA
//! P-256 / SHA-256 signature (base64 DER) over the canonical JSON of
//! `{version, method, url, body, headers}` with keys sorted.

use base64ct::{Base64, Encoding};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use serde_json::{json, Value};

use crate::error::{WalletError, WalletResult};

pub const AUTHORIZATION_SIGNATURE_HEADER: &str = "privy-authorization-signature";
const KEY_PREFIX: &str = "wallet-auth:";
const PAYLOAD_VERSION: u8 = 1;

/// Canonical payload. `serde_json` maps are ordered, so nested keys sort too.
pub fn canonical_payload(method: &str, url: &str, body: &Value, app_id: &str) -> String {
    json!({
        "version": PAYLOAD_VERSION,
        "method": method,
        "url": url,
        "body": body,
        "headers": { "privy-app-id": app_id },
    })
    .to_string()
}

/// P-256 authorization key (`wallet-auth:` + base64 PKCS#8 DER).
pub struct AuthorizationKey {
    key: SigningKey,
}

impl AuthorizationKey {
    pub fn parse(raw: &str) -> WalletResult<Self> {
        let encoded = raw.trim();
        let encoded = encoded.strip_prefix(KEY_PREFIX).unwrap_or(encoded);
        let der = Base64::decode_vec(encoded).map_err(|_| {
            WalletError::InvalidArgument("authorization key is not valid base64".into())
        })?;
        let key = SigningKey::from_pkcs8_der(&der).map_err(|_| {
            WalletError::InvalidArgument("authorization key is not a PKCS#8 P-256 key".into())
        })?;
        Ok(Self { key })
    }

    /// Base64 DER signature for a request.
    pub fn sign_request(&self, method: &str, url: &str, body: &Value, app_id: &str) -> String {
        let payload = canonical_payload(method, url, body, app_id);
        let signature: Signature = self.key.sign(payload.as_bytes());
        Base64::encode_string(signature.to_der().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Verifier, VerifyingKey};
    use p256::pkcs8::EncodePrivateKey;

    fn test_key() -> (SigningKey, String) {
        let key = SigningKey::from_slice(&[7u8; 32]).unwrap();
        let der = key.to_pkcs8_der().unwrap();
        let encoded = format!("{KEY_PREFIX}{}", Base64::encode_string(der.as_bytes()));
        (key, encoded)
    }

    #[test]
    fn payload_keys_are_sorted() {
        let payload = canonical_payload(
            "POST",
            "https://api.privy.io/v1/wallets/w1/raw_sign",
            &json!({ "params": { "hash": "0x1" } }),
            "app",
        );
        assert_eq!(
            payload,
            r#"{"body":{"params":{"hash":"0x1"}},"headers":{"privy-app-id":"app"},"method":"POST","url":"https://api.privy.io/v1/wallets/w1/raw_sign","version":1}"#
        );
    }

    #[test]
    fn signatures_verify_against_the_key() {
        let (key, encoded) = test_key();
        let auth_key = AuthorizationKey::parse(&encoded).unwrap();
        let body = json!({ "params": { "hash": "0xabc" } });
        let signature_b64 = auth_key.sign_request("POST", "https://x/raw_sign", &body, "app");

        let der = Base64::decode_vec(&signature_b64).unwrap();
        let signature = Signature::from_der(&der).unwrap();
        let payload = canonical_payload("POST", "https://x/raw_sign", &body, "app");
        assert!(VerifyingKey::from(&key)
            .verify(payload.as_bytes(), &signature)
            .is_ok());
    }

    #[test]
    fn prefix_is_optional() {
        let (_, encoded) = test_key();
        let bare = encoded.trim_start_matches(KEY_PREFIX);
        assert!(AuthorizationKey::parse(bare).is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(AuthorizationKey::parse("wallet-auth:???").is_err());
        assert!(AuthorizationKey::parse("wallet-auth:aGVsbG8=").is_err());
    }
}
