// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-user authorization key cache.
//!
//! Keys are fetched from the identity provider on a miss and reused until
//! shortly before they expire. Concurrent misses may both fetch; the last
//! write wins.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use tracing::debug;

use super::client::{IdentityProvider, UserSigner};
use crate::error::{WalletError, WalletResult};

/// Keys are refreshed this long before they expire.
pub const REFRESH_SKEW: Duration = Duration::seconds(5);
const DEFAULT_CAPACITY: usize = 1024;

struct CachedKey {
    authorization_key: String,
    expires_at: DateTime<Utc>,
}

pub struct AuthorizationKeyCache {
    cache: Mutex<LruCache<String, CachedKey>>,
}

impl Default for AuthorizationKeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AuthorizationKeyCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached key if it is still valid at `now` (with the refresh skew).
    pub fn get_at(&self, user_id: &str, now: DateTime<Utc>) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(user_id) {
            Some(entry) if now < entry.expires_at - REFRESH_SKEW => {
                Some(entry.authorization_key.clone())
            }
            Some(_) => {
                cache.pop(user_id);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, user_id: &str, signer: &UserSigner) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                user_id.to_string(),
                CachedKey {
                    authorization_key: signer.authorization_key.clone(),
                    expires_at: signer.expires_at,
                },
            );
        }
    }

    pub fn invalidate(&self, user_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(user_id);
        }
    }

    /// Authorization key for `user_id`, fetched with `credential` on a miss.
    pub async fn get_user_authorization_key(
        &self,
        provider: &dyn IdentityProvider,
        credential: &str,
        user_id: &str,
    ) -> WalletResult<String> {
        if user_id.trim().is_empty() {
            return Err(WalletError::InvalidArgument("user id is required".into()));
        }
        if let Some(key) = self.get_at(user_id, Utc::now()) {
            debug!(user_id, "Authorization key cache hit");
            return Ok(key);
        }
        let signer = provider.generate_user_signer(credential).await?;
        self.put(user_id, &signer);
        debug!(user_id, expires_at = %signer.expires_at, "Authorization key refreshed");
        Ok(signer.authorization_key)
    }
}
