// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{AuthError, JwksManager};
use crate::config::{AppConfig, IdentityConfig};
use crate::providers::TransakClient;
use crate::storage::DepositDatabase;

/// Bearer token verification settings resolved at startup.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// `None` selects the development decode path.
    pub jwks: Option<JwksManager>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl AuthConfig {
    pub fn from_identity(identity: &IdentityConfig) -> Result<Self, AuthError> {
        let jwks = identity.jwks_url.as_deref().map(JwksManager::new).transpose()?;
        Ok(Self {
            jwks,
            issuer: identity.issuer.clone(),
            audience: identity.audience.clone(),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub deposits: Arc<DepositDatabase>,
    pub config: Arc<AppConfig>,
    pub auth_config: AuthConfig,
    /// `None` when partner credentials are not configured.
    pub transak: Option<Arc<TransakClient>>,
}

impl AppState {
    pub fn new(deposits: DepositDatabase, config: AppConfig) -> Self {
        Self {
            deposits: Arc::new(deposits),
            config: Arc::new(config),
            auth_config: AuthConfig::default(),
            transak: None,
        }
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn with_transak(mut self, client: TransakClient) -> Self {
        self.transak = Some(Arc::new(client));
        self
    }
}

/// Fresh state on a temporary database with default configuration.
#[cfg(test)]
pub(crate) fn test_state() -> (AppState, tempfile::TempDir) {
    test_state_with(|_| None)
}

#[cfg(test)]
pub(crate) fn test_state_with(
    lookup: impl Fn(&str) -> Option<String>,
) -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::from_lookup(lookup);
    let deposits = DepositDatabase::open(&dir.path().join("deposits.redb")).unwrap();
    (AppState::new(deposits, config), dir)
}
