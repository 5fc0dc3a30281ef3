// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Purchase session creation.
//!
//! Mints a fiat provider widget session bound to the caller and the custodial
//! deposit address, then records an `INITIATED` deposit for it. Nothing is
//! persisted when the provider call fails. Retries are not deduplicated: each
//! call creates a new provider session and a new deposit.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::user_tags::ensure_user_tag;
use crate::{
    auth::Auth,
    error::ApiError,
    providers::{TransakError, WidgetSessionRequest},
    state::AppState,
    storage::{Deposit, Destination, EventSource, FiatProviderState, Money, TimelineEntry},
};

const SESSION_CREATED: &str = "SESSION_CREATED";

/// Request body for `POST /session`.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSessionRequest {
    /// Positive amount with at most two decimals, as a number or string.
    #[schema(value_type = Option<String>, example = "100.00")]
    pub fiat_amount: Option<Value>,
    /// Accepted when `fiatAmount` is absent or invalid.
    #[schema(value_type = Option<String>)]
    pub default_fiat_amount: Option<Value>,
    pub fiat_currency: Option<String>,
    pub payment_method: Option<String>,
    /// Expected crypto amount; also used to match the custodial transfer.
    #[schema(value_type = Option<String>)]
    pub crypto_amount: Option<Value>,
    pub redirect_url: Option<String>,
    pub widget_variant: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub ok: bool,
    pub deposit_id: String,
    pub session_id: Option<String>,
    pub widget_url: String,
    pub environment: String,
    pub destination: Destination,
}

/// Create a purchase session and its deposit.
#[utoipa::path(
    post,
    path = "/session",
    tag = "Deposits",
    security(("bearer_auth" = [])),
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Invalid body or amount"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Origin not allowed"),
        (status = 500, description = "Credentials missing or store failure"),
        (status = 502, description = "Provider failure")
    )
)]
pub async fn create_session(
    Auth(user): Auth,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let config = &state.config;

    let origin = request_origin(&headers);
    if !config.fiat.origin_allowed(origin.as_deref()) {
        warn!(origin = ?origin, "Session request from origin outside the allowlist");
        return Err(ApiError::forbidden("origin_not_allowed"));
    }

    let Some(client) = state.transak.as_ref() else {
        error!("Transak API credentials are not configured");
        return Err(ApiError::internal("transak_credentials_missing"));
    };

    let request = parse_body(&body)?;
    let fiat_amount = request
        .fiat_amount
        .as_ref()
        .and_then(parse_fiat_amount)
        .or_else(|| request.default_fiat_amount.as_ref().and_then(parse_fiat_amount))
        .ok_or_else(|| ApiError::bad_request("invalid_amount"))?;
    let crypto_amount = request.crypto_amount.as_ref().and_then(parse_crypto_amount);
    let fiat_currency = non_empty(request.fiat_currency.as_deref())
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| config.deposit.default_fiat_currency.clone());
    let payment_method = non_empty(request.payment_method.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| config.deposit.default_payment_method.clone());

    let destination_tag = match config.deposit.pinned_tag {
        Some(ref pinned) => pinned.clone(),
        None => ensure_user_tag(&state.deposits, &user.user_id)?.0,
    };
    let referrer_domain = referrer_domain(origin.as_deref());
    let asset = config.deposit.asset.clone();

    let session = client
        .create_widget_session(&WidgetSessionRequest {
            partner_customer_id: user.user_id.clone(),
            email: user.email.clone(),
            referrer_domain: referrer_domain.clone(),
            fiat_currency: fiat_currency.clone(),
            fiat_amount,
            crypto_currency_code: asset.clone(),
            crypto_amount,
            payment_method: payment_method.clone(),
            wallet_address: config.deposit.address.clone(),
            wallet_address_tag: destination_tag.clone(),
            redirect_url: non_empty(request.redirect_url.as_deref()).map(str::to_string),
            widget_variant: non_empty(request.widget_variant.as_deref()).map(str::to_string),
        })
        .await
        .map_err(|e| {
            error!(user_id = %user.user_id, error = %e, "Transak session creation failed");
            match e {
                TransakError::MissingConfig(_) => ApiError::internal("transak_credentials_missing"),
                TransakError::Auth(_) => ApiError::bad_gateway("transak_token_unavailable"),
                TransakError::Request(_) | TransakError::InvalidResponse(_) => {
                    ApiError::bad_gateway("transak_session_failed")
                }
            }
        })?;

    let environment = client.environment().as_str().to_string();
    let destination = Destination {
        address: Some(config.deposit.address.clone()),
        tag: Some(destination_tag),
    };
    let mut deposit = Deposit::initiated(
        user.user_id.clone(),
        asset.clone(),
        environment.clone(),
        Money {
            currency: fiat_currency,
            amount: fiat_amount,
        },
        crypto_amount.map(|amount| Money {
            currency: asset,
            amount,
        }),
        destination.clone(),
        FiatProviderState {
            session_id: session.session_id.clone(),
            widget_url: Some(session.widget_url.clone()),
            status: Some(SESSION_CREATED.to_string()),
            payment_method: Some(payment_method),
            partner_customer_id: Some(user.user_id.clone()),
            referrer_domain: Some(referrer_domain),
            environment: Some(environment.clone()),
            ..FiatProviderState::default()
        },
    );
    deposit.record(TimelineEntry::new(
        EventSource::Fiat,
        SESSION_CREATED,
        json!({
            "sessionId": session.session_id,
            "widgetUrl": session.widget_url,
        }),
    ));

    state.deposits.insert_deposit(&deposit).map_err(|e| {
        error!(user_id = %user.user_id, error = %e, "Failed to persist deposit");
        ApiError::internal("internal_error")
    })?;

    info!(
        deposit_id = %deposit.deposit_id,
        user_id = %user.user_id,
        session_id = ?session.session_id,
        environment = %environment,
        "Created purchase session"
    );

    Ok(Json(CreateSessionResponse {
        ok: true,
        deposit_id: deposit.deposit_id,
        session_id: session.session_id,
        widget_url: session.widget_url,
        environment,
        destination,
    }))
}

fn parse_body(body: &[u8]) -> Result<CreateSessionRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CreateSessionRequest::default());
    }
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("invalid_body"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Positive amount with at most two decimal places.
///
/// Numbers and numeric strings are both accepted. The value is checked on its
/// decimal text so `10.1` passes and `10.123` does not.
pub fn parse_fiat_amount(value: &Value) -> Option<f64> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        _ => return None,
    };

    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text.as_str(), ""),
    };
    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if fraction.len() > 2 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: u64 = whole.parse().ok()?;
    let fraction: u64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    let minor = whole.checked_mul(100)?.checked_add(fraction)?;
    if minor == 0 {
        return None;
    }
    Some(minor as f64 / 100.0)
}

fn parse_crypto_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None,
    };
    (amount.is_finite() && amount > 0.0).then_some(amount)
}

/// Lower-cased `Origin`, else the origin of `Referer`.
fn request_origin(headers: &HeaderMap) -> Option<String> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != "null");
    if let Some(origin) = origin {
        return Some(origin.trim_end_matches('/').to_ascii_lowercase());
    }

    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    let url = url::Url::parse(referer).ok()?;
    match url.origin() {
        origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization().to_ascii_lowercase()),
        url::Origin::Opaque(_) => None,
    }
}

/// `host[:port]` of the caller's origin, else `localhost`.
fn referrer_domain(origin: Option<&str>) -> String {
    let Some(origin) = origin else {
        return "localhost".to_string();
    };
    match url::Url::parse(origin) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => "localhost".to_string(),
        },
        Err(_) => origin
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string(),
    }
}
