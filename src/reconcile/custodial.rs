// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodial wallet provider events.
//!
//! A custodial transfer carries a destination tag, an asset and an amount but
//! no deposit ID. This module normalizes the webhook body and knows how to
//! fold an event into a matched deposit or into a synthetic review record.
//! The correlation itself lives in [`super::matching`].

use chrono::Utc;
use serde_json::{json, Map, Value};

use super::lifecycle::{advance, DepositStatus, Transition};
use super::payload::{
    first_amount, first_text, normalize_status, parse_json, pointer_text, PayloadError,
    PayloadShape,
};
use crate::storage::{
    CustodialProviderState, Deposit, DepositOrigin, Destination, EventSource, Money, TimelineEntry,
};

/// Payload locations of the destination tag, highest priority first.
const TAG_POINTERS: [&str; 4] = [
    "/destination/tag",
    "/destination/oneTimeAddress/tag",
    "/destination/extraParameters/destinationTag",
    "/txInfo/destinationTag",
];

/// Coarse outcome a custodial status stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustodialStatusClass {
    Settled,
    Failed,
    InProgress,
}

impl CustodialStatusClass {
    pub fn of(status: &str) -> Self {
        match status {
            "COMPLETED" | "CONFIRMED" => CustodialStatusClass::Settled,
            "FAILED" | "CANCELLED" | "REJECTED" => CustodialStatusClass::Failed,
            _ => CustodialStatusClass::InProgress,
        }
    }

    pub fn deposit_status(self) -> DepositStatus {
        match self {
            CustodialStatusClass::Settled => DepositStatus::Settled,
            CustodialStatusClass::Failed => DepositStatus::Failed,
            CustodialStatusClass::InProgress => DepositStatus::AwaitingSettlement,
        }
    }
}

/// A custodial provider webhook, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct CustodialEvent {
    pub transaction_id: Option<String>,
    /// Upper-cased provider status, `UNKNOWN` when absent.
    pub status: String,
    pub sub_status: Option<String>,
    pub asset_id: String,
    pub tx_hash: Option<String>,
    pub amount: Option<f64>,
    pub destination_tag: Option<String>,
    pub confirmations: Option<u64>,
    pub last_updated: Option<i64>,
    /// Event body as received, kept on synthetic records.
    pub raw: Value,
}

impl CustodialEvent {
    /// Parse a raw webhook body. `default_asset` fills in a missing asset ID.
    pub fn parse(raw: &[u8], default_asset: &str) -> Result<Self, PayloadError> {
        let value = parse_json(raw)?;
        let shape = PayloadShape::of(&value)?;
        let body = shape.body();

        Ok(Self {
            transaction_id: first_text(body, &["id", "txId"]),
            status: normalize_status(first_text(body, &["status"])),
            sub_status: first_text(body, &["subStatus"]),
            asset_id: first_text(body, &["assetId", "asset"])
                .unwrap_or_else(|| default_asset.to_string()),
            tx_hash: first_text(body, &["txHash", "hash"]),
            amount: first_amount(body, &["amount"]).or_else(|| {
                body.get("amountInfo")
                    .and_then(Value::as_object)
                    .and_then(|info| first_amount(info, &["amount"]))
            }),
            destination_tag: extract_destination_tag(body),
            confirmations: ["numConfirmations", "confirmations"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_u64)),
            last_updated: body.get("lastUpdated").and_then(Value::as_i64),
            raw: shape.body_value(),
        })
    }

    pub fn status_class(&self) -> CustodialStatusClass {
        CustodialStatusClass::of(&self.status)
    }

    fn details(&self, proposed: DepositStatus, applied: bool) -> Value {
        json!({
            "transactionId": self.transaction_id,
            "txHash": self.tx_hash,
            "subStatus": self.sub_status,
            "amount": self.amount,
            "asset": self.asset_id,
            "userTag": self.destination_tag,
            "depositStatus": proposed,
            "statusApplied": applied,
        })
    }
}

fn extract_destination_tag(body: &Map<String, Value>) -> Option<String> {
    TAG_POINTERS
        .iter()
        .find_map(|pointer| pointer_text(body, pointer))
}

/// Custodial environment label derived from the provider base URL.
pub fn custodial_environment(base_url: Option<&str>) -> &'static str {
    let sandbox = base_url.is_some_and(|url| {
        let url = url.to_ascii_lowercase();
        ["sandbox", "stg", "test"]
            .iter()
            .any(|marker| url.contains(marker))
    });
    if sandbox {
        "SANDBOX"
    } else {
        "PRODUCTION"
    }
}

/// Fold `event` into an existing document under the forward-only guard.
pub fn apply_custodial_event(
    deposit: &mut Deposit,
    event: &CustodialEvent,
    environment: &str,
) -> Transition {
    let proposed = event.status_class().deposit_status();
    let transition = advance(deposit.status, proposed);
    let applied = !matches!(transition, Transition::Held { .. });
    deposit.status = transition.resulting_status();

    let state = &mut deposit.custodial_provider;
    if event.transaction_id.is_some() {
        state.transaction_id.clone_from(&event.transaction_id);
    }
    if event.tx_hash.is_some() {
        state.tx_hash.clone_from(&event.tx_hash);
    }
    if event.amount.is_some() {
        state.amount = event.amount;
    }
    if event.confirmations.is_some() {
        state.confirmations = event.confirmations;
    }
    if event.last_updated.is_some() {
        state.last_updated = event.last_updated;
    }
    if applied {
        state.status = Some(event.status.clone());
        state.sub_status.clone_from(&event.sub_status);
    }
    state.asset_id = Some(event.asset_id.clone());
    state.environment = Some(environment.to_string());
    state.event_received_at = Some(Utc::now());

    deposit.record(TimelineEntry::new(
        EventSource::Custodial,
        event.status.clone(),
        event.details(proposed, applied),
    ));

    transition
}

/// Build a review record preserving an event no deposit could claim.
///
/// `status` must be one of the review states.
pub fn synthetic_record(
    status: DepositStatus,
    event: &CustodialEvent,
    user_id: Option<String>,
    environment: &str,
    candidates: Vec<String>,
) -> Deposit {
    debug_assert!(status.is_review());

    let crypto = event.amount.map(|amount| Money {
        currency: event.asset_id.clone(),
        amount,
    });
    let mut details = event.details(event.status_class().deposit_status(), false);
    if !candidates.is_empty() {
        details["candidateDepositIds"] = json!(&candidates);
    }

    let mut record = Deposit::blank(
        user_id,
        status,
        DepositOrigin::CustodialWebhook,
        event.asset_id.clone(),
        environment.to_string(),
    )
    .with_amounts(None, crypto)
    .with_destination(Destination {
        address: None,
        tag: event.destination_tag.clone(),
    })
    .with_custodial_provider(CustodialProviderState {
        transaction_id: event.transaction_id.clone(),
        tx_hash: event.tx_hash.clone(),
        status: Some(event.status.clone()),
        sub_status: event.sub_status.clone(),
        confirmations: event.confirmations,
        asset_id: Some(event.asset_id.clone()),
        amount: event.amount,
        environment: Some(environment.to_string()),
        last_updated: event.last_updated,
        event_received_at: Some(Utc::now()),
        candidate_deposit_ids: candidates,
        last_event: Some(event.raw.clone()),
    });

    record.record(TimelineEntry::new(
        EventSource::Custodial,
        event.status.clone(),
        details,
    ));
    record
}
