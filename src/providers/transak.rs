// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fiat purchase provider (Transak) partner API client.
//!
//! Two calls are used: the partner refresh-token endpoint and the gateway
//! widget-session endpoint. Access tokens are shared through [`TokenCache`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use super::token_cache::{CachedToken, TokenCache};
use crate::config::{FiatEnvironment, FiatProviderConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Used when neither the token nor the response carries an expiry.
const FALLBACK_TOKEN_LIFETIME: chrono::Duration = chrono::Duration::hours(5);

/// Longest provider body excerpt kept in an error message.
const BODY_EXCERPT: usize = 400;

#[derive(Debug, thiserror::Error)]
pub enum TransakError {
    #[error("Transak configuration missing: {0}")]
    MissingConfig(String),

    #[error("Transak auth failed: {0}")]
    Auth(String),

    #[error("Transak request failed: {0}")]
    Request(String),

    #[error("Transak response was invalid: {0}")]
    InvalidResponse(String),
}

/// Parameters of one purchase widget session.
#[derive(Debug, Clone)]
pub struct WidgetSessionRequest {
    pub partner_customer_id: String,
    pub email: Option<String>,
    pub referrer_domain: String,
    pub fiat_currency: String,
    pub fiat_amount: f64,
    pub crypto_currency_code: String,
    pub crypto_amount: Option<f64>,
    pub payment_method: String,
    pub wallet_address: String,
    pub wallet_address_tag: String,
    pub redirect_url: Option<String>,
    pub widget_variant: Option<String>,
}

/// A minted widget session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSession {
    pub session_id: Option<String>,
    pub widget_url: String,
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    #[serde(default)]
    exp: Option<i64>,
}

pub struct TransakClient {
    api_key: String,
    api_secret: String,
    environment: FiatEnvironment,
    api_base_url: String,
    gateway_base_url: String,
    tokens: Arc<TokenCache>,
    http: Client,
}

impl TransakClient {
    pub fn from_config(config: &FiatProviderConfig, tokens: Arc<TokenCache>) -> Result<Self, TransakError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| TransakError::MissingConfig("TRANSAK_API_KEY".to_string()))?;
        let api_secret = config
            .api_secret
            .clone()
            .ok_or_else(|| TransakError::MissingConfig("TRANSAK_API_SECRET".to_string()))?;

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransakError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            api_secret,
            environment: config.environment,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            gateway_base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
            tokens,
            http,
        })
    }

    pub fn environment(&self) -> FiatEnvironment {
        self.environment
    }

    /// Cached partner token, refreshed when missing or close to expiry.
    pub async fn access_token(&self) -> Result<String, TransakError> {
        if let Some(token) = self.tokens.get(self.environment, Utc::now()) {
            return Ok(token);
        }
        let fresh = self.refresh_token().await?;
        let token = fresh.token.clone();
        self.tokens.put(self.environment, fresh);
        Ok(token)
    }

    /// Call the partner refresh-token endpoint.
    pub async fn refresh_token(&self) -> Result<CachedToken, TransakError> {
        let url = format!("{}/partners/api/v2/refresh-token", self.api_base_url);
        let response = self
            .http
            .post(&url)
            .header("accept", "application/json")
            .header("api-secret", &self.api_secret)
            .json(&json!({ "apiKey": self.api_key }))
            .send()
            .await
            .map_err(|e| TransakError::Auth(format!("refresh-token request failed: {e}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(%status, body = excerpt(&text), "Transak refresh-token failed");
            return Err(TransakError::Auth(format!("refresh-token returned {status}")));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| TransakError::Auth(format!("invalid refresh-token response: {e}")))?;
        let token = read_field(&body, "accessToken")
            .and_then(Value::as_str)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| TransakError::Auth("refresh-token response missing accessToken".to_string()))?
            .to_string();

        let expires_at = token_expiry(&token)
            .or_else(|| {
                read_field(&body, "expiresAt")
                    .and_then(Value::as_i64)
                    .filter(|secs| *secs > 0)
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            })
            .unwrap_or_else(|| Utc::now() + FALLBACK_TOKEN_LIFETIME);

        info!(environment = %self.environment, %expires_at, "Refreshed Transak partner token");
        Ok(CachedToken { token, expires_at })
    }

    /// Mint a widget session for one purchase.
    pub async fn create_widget_session(&self, request: &WidgetSessionRequest) -> Result<WidgetSession, TransakError> {
        let access_token = self.access_token().await?;
        let url = format!("{}/api/v2/auth/session", self.gateway_base_url);

        let response = self
            .http
            .post(&url)
            .header("accept", "application/json")
            .header("access-token", access_token)
            .json(&json!({ "widgetParams": self.widget_params(request) }))
            .send()
            .await
            .map_err(|e| TransakError::Request(format!("POST /api/v2/auth/session failed: {e}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // Next call fetches a new token
            self.tokens.invalidate(self.environment);
            error!(%status, body = excerpt(&text), "Transak rejected the partner access token");
            return Err(TransakError::Auth(format!("POST /api/v2/auth/session returned {status}")));
        }
        if !status.is_success() {
            error!(%status, body = excerpt(&text), "Transak session creation failed");
            return Err(TransakError::Request(format!("POST /api/v2/auth/session returned {status}")));
        }

        let widget_url = body
            .get("widgetUrl")
            .or_else(|| body.pointer("/data/widgetUrl"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                error!(body = excerpt(&text), "Transak session response missing widgetUrl");
                TransakError::InvalidResponse("missing widgetUrl in session response".to_string())
            })?;

        let session_id = body
            .get("session_id")
            .or_else(|| body.pointer("/data/sessionId"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| session_id_from_url(&widget_url));

        Ok(WidgetSession { session_id, widget_url })
    }

    fn widget_params(&self, request: &WidgetSessionRequest) -> Value {
        let mut params = Map::new();
        params.insert("apiKey".into(), json!(self.api_key));
        params.insert("referrerDomain".into(), json!(request.referrer_domain));
        params.insert("partnerCustomerId".into(), json!(request.partner_customer_id));
        params.insert("fiatCurrency".into(), json!(request.fiat_currency));
        params.insert("defaultFiatAmount".into(), json!(request.fiat_amount.to_string()));
        params.insert("cryptoCurrencyCode".into(), json!(request.crypto_currency_code));
        params.insert("walletAddress".into(), json!(request.wallet_address));
        params.insert("walletAddressTag".into(), json!(request.wallet_address_tag));
        params.insert("disableWalletAddressForm".into(), json!(true));
        params.insert("defaultPaymentMethod".into(), json!(request.payment_method));
        if let Some(amount) = request.crypto_amount {
            params.insert("defaultCryptoAmount".into(), json!(amount.to_string()));
        }
        if let Some(ref email) = request.email {
            params.insert("email".into(), json!(email));
        }
        if let Some(ref redirect_url) = request.redirect_url {
            params.insert("redirectUrl".into(), json!(redirect_url));
        }
        if let Some(ref widget_variant) = request.widget_variant {
            params.insert("widgetVariant".into(), json!(widget_variant));
        }
        Value::Object(params)
    }
}

/// `field` at the top level, else under `data`.
fn read_field<'a>(body: &'a Value, field: &str) -> Option<&'a Value> {
    body.get(field)
        .or_else(|| body.get("data").and_then(|data| data.get(field)))
}

/// `exp` of a provider-issued JWT, read without verification.
fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let data = jsonwebtoken::dangerous::insecure_decode::<ExpiryClaims>(token).ok()?;
    data.claims
        .exp
        .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
}

fn session_id_from_url(widget_url: &str) -> Option<String> {
    let url = url::Url::parse(widget_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "sessionId")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(BODY_EXCERPT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
