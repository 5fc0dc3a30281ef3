// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup. Empty or
//! whitespace-only values count as unset.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `deposits.redb` | `./data` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM certificate chain and key; HTTPS when both set | unset |
//! | `IDENTITY_JWKS_URL` | JWKS endpoint for bearer identity tokens | Required for production |
//! | `IDENTITY_ISSUER` | Expected JWT issuer claim | Optional |
//! | `IDENTITY_AUDIENCE` | Expected JWT audience claim | Optional |
//! | `TRANSAK_API_KEY` / `TRANSAK_API_SECRET` | Fiat provider partner credentials | Required for `/session` |
//! | `TRANSAK_ENV` | `STAGING` or `PRODUCTION` | `STAGING` |
//! | `TRANSAK_WEBHOOK_SECRET` | HMAC key for fiat webhooks | Required for `/webhooks/fiat` |
//! | `TRANSAK_ALLOWED_ORIGINS` | CSV origin allowlist for `/session` | any origin |
//! | `TRANSAK_API_BASE_URL` | Fiat provider partner API base | per environment |
//! | `TRANSAK_GATEWAY_BASE_URL` | Fiat provider session gateway base | per environment |
//! | `FIREBLOCKS_API_KEY` / `FIREBLOCKS_API_PRIVATE_KEY` | Custodial provider secrets | Required for `/webhooks/custodial` |
//! | `FIREBLOCKS_BASE_URL` | Custodial API base, decides the environment label | `PRODUCTION` |
//! | `DEPOSIT_ASSET` | Supported crypto asset | `XRP` |
//! | `DEPOSIT_ADDRESS` | Custodial deposit address | `rBHj9ACjFZo5U9SFzaLWZSScdcXoVuMRY5` |
//! | `DEPOSIT_PINNED_TAG` | Tag used for every session instead of the user's own | unset |
//! | `DEFAULT_FIAT_CURRENCY` | Session fiat currency fallback | `USD` |
//! | `DEFAULT_PAYMENT_METHOD` | Session payment method fallback | `credit_debit_card` |

use std::path::PathBuf;

use crate::reconcile::custodial_environment;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "./data";

/// File name of the deposit database inside the data directory.
pub const DEPOSIT_DB_FILE: &str = "deposits.redb";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

pub const DEFAULT_ASSET: &str = "XRP";
pub const DEFAULT_DEPOSIT_ADDRESS: &str = "rBHj9ACjFZo5U9SFzaLWZSScdcXoVuMRY5";
pub const DEFAULT_FIAT_CURRENCY: &str = "USD";
pub const DEFAULT_PAYMENT_METHOD: &str = "credit_debit_card";

/// Fiat provider environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiatEnvironment {
    Staging,
    Production,
}

impl FiatEnvironment {
    /// Anything other than `PRODUCTION` (case-insensitive) is staging.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_uppercase()) {
            Some(value) if value == "PRODUCTION" => FiatEnvironment::Production,
            _ => FiatEnvironment::Staging,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FiatEnvironment::Staging => "STAGING",
            FiatEnvironment::Production => "PRODUCTION",
        }
    }

    pub fn default_api_base_url(self) -> &'static str {
        match self {
            FiatEnvironment::Staging => "https://api-stg.transak.com",
            FiatEnvironment::Production => "https://api.transak.com",
        }
    }

    pub fn default_gateway_base_url(self) -> &'static str {
        match self {
            FiatEnvironment::Staging => "https://api-gateway-stg.transak.com",
            FiatEnvironment::Production => "https://api-gateway.transak.com",
        }
    }
}

impl std::fmt::Display for FiatEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Bearer token verification settings.
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    pub jwks_url: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

/// Fiat purchase provider settings.
#[derive(Debug, Clone)]
pub struct FiatProviderConfig {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub environment: FiatEnvironment,
    pub webhook_secret: Option<String>,
    /// Lower-cased origins; empty means any origin.
    pub allowed_origins: Vec<String>,
    pub api_base_url: String,
    pub gateway_base_url: String,
}

impl FiatProviderConfig {
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|origin| {
            let origin = origin.to_ascii_lowercase();
            self.allowed_origins.iter().any(|allowed| *allowed == origin)
        })
    }
}

/// Custodial wallet provider settings.
#[derive(Debug, Clone, Default)]
pub struct CustodialProviderConfig {
    pub api_key: Option<String>,
    pub api_private_key: Option<String>,
    pub base_url: Option<String>,
}

impl CustodialProviderConfig {
    pub fn has_secrets(&self) -> bool {
        self.api_key.is_some() && self.api_private_key.is_some()
    }

    /// `SANDBOX` or `PRODUCTION`.
    pub fn environment(&self) -> &'static str {
        custodial_environment(self.base_url.as_deref())
    }
}

/// Where purchases are delivered.
#[derive(Debug, Clone)]
pub struct DepositConfig {
    pub asset: String,
    pub address: String,
    pub pinned_tag: Option<String>,
    pub default_fiat_currency: String,
    pub default_payment_method: String,
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub tls: Option<TlsConfig>,
    pub identity: IdentityConfig,
    pub fiat: FiatProviderConfig,
    pub custodial: CustodialProviderConfig,
    pub deposit: DepositConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let var_or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let environment = FiatEnvironment::parse(var("TRANSAK_ENV").as_deref());
        let tls = match (var("TLS_CERT_PATH"), var("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            _ => None,
        };

        Self {
            host: var_or("HOST", DEFAULT_HOST),
            port: var("PORT")
                .and_then(|port| port.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            data_dir: PathBuf::from(var_or(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            tls,
            identity: IdentityConfig {
                jwks_url: var("IDENTITY_JWKS_URL"),
                issuer: var("IDENTITY_ISSUER"),
                audience: var("IDENTITY_AUDIENCE"),
            },
            fiat: FiatProviderConfig {
                api_key: var("TRANSAK_API_KEY"),
                api_secret: var("TRANSAK_API_SECRET"),
                environment,
                webhook_secret: var("TRANSAK_WEBHOOK_SECRET"),
                allowed_origins: parse_origins(var("TRANSAK_ALLOWED_ORIGINS").as_deref()),
                api_base_url: var_or("TRANSAK_API_BASE_URL", environment.default_api_base_url()),
                gateway_base_url: var_or(
                    "TRANSAK_GATEWAY_BASE_URL",
                    environment.default_gateway_base_url(),
                ),
            },
            custodial: CustodialProviderConfig {
                api_key: var("FIREBLOCKS_API_KEY"),
                api_private_key: var("FIREBLOCKS_API_PRIVATE_KEY"),
                base_url: var("FIREBLOCKS_BASE_URL"),
            },
            deposit: DepositConfig {
                asset: var_or("DEPOSIT_ASSET", DEFAULT_ASSET),
                address: var_or("DEPOSIT_ADDRESS", DEFAULT_DEPOSIT_ADDRESS),
                pinned_tag: var("DEPOSIT_PINNED_TAG"),
                default_fiat_currency: var_or("DEFAULT_FIAT_CURRENCY", DEFAULT_FIAT_CURRENCY)
                    .to_ascii_uppercase(),
                default_payment_method: var_or("DEFAULT_PAYMENT_METHOD", DEFAULT_PAYMENT_METHOD),
            },
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DEPOSIT_DB_FILE)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_origins(raw: Option<&str>) -> Vec<String> {
    raw.map(|csv| {
        csv.split(',')
            .map(|entry| entry.trim().trim_end_matches('/').to_ascii_lowercase())
            .filter(|entry| !entry.is_empty())
            .collect()
    })
    .unwrap_or_default()
}
