// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodial wallet provider webhook.
//!
//! Transfers carry no deposit ID, only a destination tag and an amount, so
//! they are correlated heuristically. Events that cannot be matched to
//! exactly one deposit are kept as synthetic review records and still
//! acknowledged with 200: a retry would not change the outcome.
//!
//! There is no signature check on this endpoint. It relies on network-level
//! allowlisting of the provider.

use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    reconcile::{CustodialEvent, Transition},
    state::AppState,
    storage::{CustodialOutcome, UnmatchedReason},
};

#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustodialWebhookResponse {
    pub ok: bool,
    /// Matched deposit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmatched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambiguous: Option<bool>,
    /// Synthetic review record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CustodialWebhookResponse {
    fn from_outcome(outcome: CustodialOutcome) -> Self {
        match outcome {
            CustodialOutcome::Matched { deposit_id, .. } => Self {
                ok: true,
                deposit_id: Some(deposit_id),
                ..Self::default()
            },
            CustodialOutcome::Unmatched { record_id, reason } => Self {
                ok: true,
                unmatched: Some(true),
                record_id: Some(record_id),
                note: (reason == UnmatchedReason::NoDestinationTag)
                    .then(|| "no_destination_tag".to_string()),
                ..Self::default()
            },
            CustodialOutcome::Ambiguous { record_id, .. } => Self {
                ok: true,
                ambiguous: Some(true),
                record_id: Some(record_id),
                ..Self::default()
            },
        }
    }
}

/// Receive a custodial transaction event.
#[utoipa::path(
    post,
    path = "/webhooks/custodial",
    tag = "Webhooks",
    request_body(content = String, description = "Custodial provider event, enveloped in `data` or flat", content_type = "application/json"),
    responses(
        (status = 200, description = "Event recorded (matched, unmatched or ambiguous)", body = CustodialWebhookResponse),
        (status = 400, description = "Malformed JSON"),
        (status = 500, description = "Custodial provider secrets not configured")
    )
)]
pub async fn receive_custodial_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CustodialWebhookResponse>, ApiError> {
    let config = &state.config;
    if !config.custodial.has_secrets() {
        error!("Custodial provider secrets are not configured");
        return Err(ApiError::internal("custodial_secrets_missing"));
    }

    let event = CustodialEvent::parse(&body, &config.deposit.asset).map_err(|e| {
        warn!(error = %e, "Malformed custodial webhook payload");
        ApiError::bad_request("invalid_json")
    })?;

    let environment = config.custodial.environment();
    let outcome = state
        .deposits
        .reconcile_custodial_event(&event, environment)
        .map_err(|e| {
            error!(transaction_id = ?event.transaction_id, error = %e, "Failed to reconcile custodial event");
            ApiError::internal("internal_error")
        })?;

    log_outcome(&event, &outcome);
    Ok(Json(CustodialWebhookResponse::from_outcome(outcome)))
}

fn log_outcome(event: &CustodialEvent, outcome: &CustodialOutcome) {
    match outcome {
        CustodialOutcome::Matched { deposit_id, transition } => match transition {
            Transition::Held { current, proposed } => warn!(
                deposit_id = %deposit_id,
                transaction_id = ?event.transaction_id,
                status = %event.status,
                current = current.as_str(),
                proposed = proposed.as_str(),
                "Custodial event did not move deposit status"
            ),
            _ => info!(
                deposit_id = %deposit_id,
                transaction_id = ?event.transaction_id,
                tx_hash = ?event.tx_hash,
                status = %event.status,
                deposit_status = transition.resulting_status().as_str(),
                "Deposit updated from custodial event"
            ),
        },
        CustodialOutcome::Unmatched { record_id, reason } => match reason {
            UnmatchedReason::NoDestinationTag => warn!(
                record_id = %record_id,
                transaction_id = ?event.transaction_id,
                tx_hash = ?event.tx_hash,
                "Custodial event without destination tag"
            ),
            UnmatchedReason::NoCandidate => warn!(
                record_id = %record_id,
                transaction_id = ?event.transaction_id,
                destination_tag = ?event.destination_tag,
                amount = ?event.amount,
                "No deposit matches custodial event"
            ),
        },
        CustodialOutcome::Ambiguous { record_id, candidates } => warn!(
            record_id = %record_id,
            transaction_id = ?event.transaction_id,
            destination_tag = ?event.destination_tag,
            candidates = ?candidates,
            "Ambiguous custodial event"
        ),
    }
}
