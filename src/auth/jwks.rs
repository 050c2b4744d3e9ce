// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! Keys are cached for [`DEFAULT_CACHE_TTL`]. A failed refresh is an error;
//! the stale set is not reused.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use tracing::debug;

use super::error::AuthError;

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Cached view of the identity provider's signing keys.
///
/// Clones share one cache.
#[derive(Clone)]
pub struct JwksManager {
    /// JWKS URL (Privy app endpoint)
    jwks_url: String,
    /// Cache TTL
    cache_ttl: Duration,
    /// Cached JWKS
    cache: Arc<RwLock<Option<CacheEntry>>>,
    /// HTTP client
    client: reqwest::Client,
}

impl JwksManager {
    /// Create a JWKS manager for `jwks_url`
    /// (e.g. `https://auth.privy.io/api/v1/apps/<app-id>/jwks.json`).
    ///
    /// Nothing is fetched until a key is first needed.
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AuthError::InternalError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            jwks_url: jwks_url.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Arc::new(RwLock::new(None)),
            client,
        })
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Seed the cache with a known key set.
    pub fn with_keys(self, jwks: JwkSet) -> Self {
        if let Ok(mut cache) = self.cache.try_write() {
            *cache = Some(CacheEntry {
                jwks,
                fetched_at: Instant::now(),
            });
        }
        self
    }

    /// Get the JWKS URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(entry.jwks.clone());
                }
            }
        }

        self.refresh().await
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;
        serde_json::from_str(&body)
            .map_err(|e| AuthError::InternalError(format!("Invalid JWKS document: {e}")))
    }

    /// Decoding key for `kid`, or the first usable key when the token has none.
    pub async fn get_decoding_key(
        &self,
        kid: Option<&str>,
    ) -> Result<(DecodingKey, Algorithm), AuthError> {
        let jwks = self.get_jwks().await?;
        match kid {
            Some(kid) => {
                let jwk = jwks
                    .keys
                    .iter()
                    .find(|k| k.common.key_id.as_deref() == Some(kid))
                    .ok_or(AuthError::NoMatchingKey)?;
                jwk_to_decoding_key(jwk)
            }
            None => jwks
                .keys
                .iter()
                .find_map(|jwk| jwk_to_decoding_key(jwk).ok())
                .ok_or(AuthError::NoMatchingKey),
        }
    }

    /// Fetch the key set and replace the cache.
    pub async fn refresh(&self) -> Result<JwkSet, AuthError> {
        let jwks = self.fetch_jwks().await?;
        debug!(keys = jwks.keys.len(), url = %self.jwks_url, "JWKS refreshed");
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(jwks)
    }

    /// Whether a fresh key set is cached.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
    }
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
    match &jwk.algorithm {
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|e| AuthError::InternalError(format!("Failed to create EC key: {e}")))?;
            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };
            Ok((key, alg))
        }
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| AuthError::InternalError(format!("Failed to create RSA key: {e}")))?;
            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                _ => Algorithm::RS256,
            };
            Ok((key, alg))
        }
        _ => Err(AuthError::InternalError(
            "Unsupported key type in JWKS".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{canned_http_server, truncated_body_server};
    use serde_json::json;

    fn key_set() -> JwkSet {
        serde_json::from_value(json!({
            "keys": [{
                "kty": "EC",
                "crv": "P-256",
                "kid": "k1",
                "alg": "ES256",
                "use": "sig",
                "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
                "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn cache_initially_empty() {
        let manager = JwksManager::new("https://auth.privy.io/api/v1/apps/app/jwks.json").unwrap();
        assert!(!manager.is_cached().await);
        assert_eq!(
            manager.jwks_url(),
            "https://auth.privy.io/api/v1/apps/app/jwks.json"
        );
    }

    #[tokio::test]
    async fn seeded_keys_resolve_by_kid() {
        let manager = JwksManager::new("https://example.com/jwks.json")
            .unwrap()
            .with_keys(key_set());
        assert!(manager.is_cached().await);

        let (_, alg) = manager.get_decoding_key(Some("k1")).await.unwrap();
        assert_eq!(alg, Algorithm::ES256);
        assert!(manager.get_decoding_key(None).await.is_ok());
        assert!(matches!(
            manager.get_decoding_key(Some("other")).await,
            Err(AuthError::NoMatchingKey)
        ));
    }

    #[tokio::test]
    async fn expired_cache_is_not_used() {
        let manager = JwksManager::new("http://127.0.0.1:9/jwks.json")
            .unwrap()
            .with_cache_ttl(Duration::ZERO)
            .with_keys(key_set());
        assert!(!manager.is_cached().await);
        assert!(matches!(
            manager.get_decoding_key(Some("k1")).await,
            Err(AuthError::JwksFetchError(_))
        ));
    }

    #[tokio::test]
    async fn fetches_and_caches_the_key_set() {
        let body = serde_json::to_string(&key_set()).unwrap();
        let url = canned_http_server(200, &body).await;
        let manager = JwksManager::new(url).unwrap();
        assert!(manager.get_decoding_key(Some("k1")).await.is_ok());
        assert!(manager.is_cached().await);
    }

    #[tokio::test]
    async fn unreadable_key_sets_are_errors() {
        let manager = JwksManager::new(truncated_body_server().await).unwrap();
        assert!(matches!(
            manager.refresh().await,
            Err(AuthError::JwksFetchError(_))
        ));

        let manager = JwksManager::new(canned_http_server(200, "not json").await).unwrap();
        assert!(matches!(
            manager.refresh().await,
            Err(AuthError::InternalError(_))
        ));
    }
}
