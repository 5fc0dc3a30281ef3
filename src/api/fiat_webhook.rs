// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fiat purchase provider webhook.
//!
//! Authenticity is an HMAC-SHA256 of the raw body keyed with
//! `TRANSAK_WEBHOOK_SECRET`. Events are applied to the deposit found by order
//! ID, then session ID. Unknown orders are acknowledged with 202 and never
//! create a deposit.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    reconcile::{FiatEvent, Transition},
    state::AppState,
    storage::FiatOutcome,
};

type HmacSha256 = Hmac<Sha256>;

/// Checked in order; the first one present is used.
const SIGNATURE_HEADERS: [&str; 3] = ["x-transak-signature", "x-transak-hmac", "transak-signature"];

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FiatWebhookResponse {
    pub ok: bool,
    pub deposit_id: String,
    /// Deposit status after the event.
    pub status: String,
    /// False when the forward-only guard held the status.
    pub status_applied: bool,
}

/// Receive a fiat provider order event.
#[utoipa::path(
    post,
    path = "/webhooks/fiat",
    tag = "Webhooks",
    request_body(content = String, description = "Raw signed provider event", content_type = "application/json"),
    params(
        ("x-transak-signature" = Option<String>, Header, description = "HMAC-SHA256 of the raw body, hex or base64")
    ),
    responses(
        (status = 200, description = "Event applied", body = FiatWebhookResponse),
        (status = 202, description = "No deposit for this order"),
        (status = 400, description = "Malformed JSON"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 500, description = "Webhook secret not configured")
    )
)]
pub async fn receive_fiat_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<FiatWebhookResponse>, ApiError> {
    let config = &state.config;
    let Some(ref secret) = config.fiat.webhook_secret else {
        error!("TRANSAK_WEBHOOK_SECRET is not configured");
        return Err(ApiError::internal("webhook_secret_missing"));
    };

    let signature = read_signature(&headers);
    if !verify_signature(secret.as_bytes(), &body, signature) {
        warn!(signature_present = signature.is_some(), "Invalid fiat webhook signature");
        return Err(ApiError::unauthorized("invalid_signature"));
    }

    let event = FiatEvent::parse(&body, &config.deposit.asset).map_err(|e| {
        warn!(error = %e, "Malformed fiat webhook payload");
        ApiError::bad_request("invalid_json")
    })?;

    let environment = config.fiat.environment.as_str();
    let outcome = state.deposits.apply_fiat_event(&event, environment).map_err(|e| {
        error!(order_id = ?event.order_id, error = %e, "Failed to apply fiat event");
        ApiError::internal("internal_error")
    })?;

    match outcome {
        FiatOutcome::NoDeposit => {
            warn!(
                order_id = ?event.order_id,
                session_id = ?event.session_id,
                partner_customer_id = ?event.partner_customer_id,
                "Deposit not found for fiat event"
            );
            Err(ApiError::accepted("deposit_not_found"))
        }
        FiatOutcome::Applied { deposit_id, transition } => {
            match transition {
                Transition::Held { current, proposed } => warn!(
                    deposit_id = %deposit_id,
                    status = %event.status,
                    current = current.as_str(),
                    proposed = proposed.as_str(),
                    "Fiat event did not move deposit status"
                ),
                _ => info!(
                    deposit_id = %deposit_id,
                    order_id = ?event.order_id,
                    status = %event.status,
                    deposit_status = transition.resulting_status().as_str(),
                    "Applied fiat event"
                ),
            }
            Ok(Json(FiatWebhookResponse {
                ok: true,
                deposit_id,
                status: transition.resulting_status().as_str().to_string(),
                status_applied: !matches!(transition, Transition::Held { .. }),
            }))
        }
    }
}

fn read_signature(headers: &HeaderMap) -> Option<&str> {
    SIGNATURE_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    })
}

/// Constant-time check of `signature` (hex or base64) against HMAC-SHA256(secret, body).
pub fn verify_signature(secret: &[u8], body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let Some(provided) = decode_signature(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

fn decode_signature(signature: &str) -> Option<Vec<u8>> {
    if let Ok(bytes) = hex::decode(signature) {
        return Some(bytes);
    }
    Base64::decode_vec(signature).ok()
}

#[cfg(test)]
pub(crate) fn sign_hex(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
