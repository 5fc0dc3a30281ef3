// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process cache for fiat provider partner access tokens.
//!
//! One entry per provider environment, so a staging token is never handed to
//! a production call. A token is only served while it has more than an hour
//! left; the caller refreshes otherwise.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;

use crate::config::FiatEnvironment;

/// Minimum remaining lifetime for a cached token to be served.
pub const REFRESH_MARGIN: Duration = Duration::hours(1);

/// A partner access token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn usable_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + REFRESH_MARGIN
    }
}

pub struct TokenCache {
    cache: Mutex<LruCache<FiatEnvironment, CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            // Staging + production
            cache: Mutex::new(LruCache::new(NonZeroUsize::MIN.saturating_add(1))),
        }
    }

    /// Token for `environment` if it is still usable at `now`.
    pub fn get(&self, environment: FiatEnvironment, now: DateTime<Utc>) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(&environment) {
            Some(entry) if entry.usable_at(now) => Some(entry.token.clone()),
            Some(_) => {
                cache.pop(&environment);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, environment: FiatEnvironment, token: CachedToken) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(environment, token);
        }
    }

    pub fn invalidate(&self, environment: FiatEnvironment) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(&environment);
        }
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}
