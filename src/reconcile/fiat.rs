// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fiat purchase provider events.
//!
//! Webhook bodies are normalized into a [`FiatEvent`] before anything looks
//! at a deposit. Correlation is exact: provider order ID first, then
//! session ID. Status mapping:
//!
//! | Provider status                                         | Deposit status        |
//! |---------------------------------------------------------|-----------------------|
//! | `AWAITING_PAYMENT`, `AWAITING_DELIVERY`, `PENDING_DELIVERY` | `PENDING`         |
//! | `COMPLETED`                                             | `AWAITING_SETTLEMENT` |
//! | `FAILED` / `CANCELLED` / `EXPIRED` / `REFUNDED`         | same name             |
//! | anything else                                           | `PENDING`             |

use chrono::Utc;
use serde_json::json;

use super::lifecycle::{advance, DepositStatus, Transition};
use super::payload::{
    first_amount, first_text, normalize_status, parse_json, PayloadError, PayloadShape,
};
use crate::storage::{Deposit, EventSource, Money, ReportedAmount, TimelineEntry};

/// A fiat provider webhook, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct FiatEvent {
    pub order_id: Option<String>,
    pub session_id: Option<String>,
    pub partner_customer_id: Option<String>,
    /// Upper-cased provider status, `UNKNOWN` when absent.
    pub status: String,
    pub fiat: Option<ReportedAmount>,
    pub crypto: ReportedAmount,
    pub tx_hash: Option<String>,
    pub wallet_address: Option<String>,
    pub wallet_address_tag: Option<String>,
    pub order_created_at: Option<String>,
    pub order_completed_at: Option<String>,
}

impl FiatEvent {
    /// Parse a raw webhook body. `default_asset` fills in a missing crypto
    /// currency.
    pub fn parse(raw: &[u8], default_asset: &str) -> Result<Self, PayloadError> {
        let value = parse_json(raw)?;
        let shape = PayloadShape::of(&value)?;
        let body = shape.body();
        let root = shape.root();

        let fiat_amount = first_amount(body, &["fiatAmount", "fiatAmountInUsd"]);
        let fiat_currency = first_text(body, &["fiatCurrency"]);
        let fiat = (fiat_amount.is_some() || fiat_currency.is_some()).then(|| ReportedAmount {
            amount: fiat_amount,
            currency: fiat_currency,
        });

        Ok(Self {
            order_id: first_text(body, &["orderId", "id"]).or_else(|| first_text(root, &["orderId"])),
            session_id: first_text(body, &["sessionId", "session_id"])
                .or_else(|| first_text(root, &["sessionId"])),
            partner_customer_id: first_text(body, &["partnerCustomerId", "userId"]),
            status: normalize_status(
                first_text(body, &["status"]).or_else(|| first_text(root, &["status"])),
            ),
            fiat,
            crypto: ReportedAmount {
                amount: first_amount(body, &["cryptoAmount", "amount"]),
                currency: Some(
                    first_text(body, &["cryptoCurrency", "cryptoCurrencyCode"])
                        .unwrap_or_else(|| default_asset.to_string()),
                ),
            },
            tx_hash: first_text(body, &["transactionHash", "txHash"]),
            wallet_address: first_text(body, &["walletAddress"]),
            wallet_address_tag: first_text(body, &["walletAddressTag", "walletTag"]),
            order_created_at: first_text(body, &["createdAt", "created_at"]),
            order_completed_at: first_text(body, &["completedAt", "completed_at"]),
        })
    }

    /// Deposit status this event proposes.
    pub fn deposit_status(&self) -> DepositStatus {
        map_fiat_status(&self.status)
    }
}

/// Map a provider status onto the deposit lifecycle.
pub fn map_fiat_status(status: &str) -> DepositStatus {
    match status {
        "AWAITING_PAYMENT" | "AWAITING_DELIVERY" | "PENDING_DELIVERY" => DepositStatus::Pending,
        "COMPLETED" => DepositStatus::AwaitingSettlement,
        "FAILED" => DepositStatus::Failed,
        "CANCELLED" => DepositStatus::Cancelled,
        "EXPIRED" => DepositStatus::Expired,
        "REFUNDED" => DepositStatus::Refunded,
        _ => DepositStatus::Pending,
    }
}

/// Apply `event` to `deposit`: mirror provider fields, move the status if the
/// transition is forward, and append one timeline entry either way.
pub fn apply_fiat_event(deposit: &mut Deposit, event: &FiatEvent, environment: &str) -> Transition {
    let proposed = event.deposit_status();
    let transition = advance(deposit.status, proposed);
    let applied = !matches!(transition, Transition::Held { .. });
    deposit.status = transition.resulting_status();

    let state = &mut deposit.fiat_provider;
    fill(&mut state.order_id, &event.order_id);
    fill(&mut state.session_id, &event.session_id);
    fill(&mut state.partner_customer_id, &event.partner_customer_id);
    fill(&mut state.tx_hash, &event.tx_hash);
    fill(&mut state.wallet_address, &event.wallet_address);
    fill(&mut state.wallet_address_tag, &event.wallet_address_tag);
    fill(&mut state.order_created_at, &event.order_created_at);
    fill(&mut state.order_completed_at, &event.order_completed_at);
    if event.fiat.is_some() {
        state.fiat = event.fiat.clone();
    }
    state.environment = Some(environment.to_string());
    state.last_event_at = Some(Utc::now());
    if applied {
        state.status = Some(event.status.clone());
    }

    // Held events never change the expected amount
    let quote = event.crypto.amount.zip(event.crypto.currency.as_ref()).filter(|_| applied);
    if let Some((amount, currency)) = quote {
        state.crypto = Some(event.crypto.clone());
        deposit.crypto = Some(Money {
            currency: currency.clone(),
            amount,
        });
    }

    deposit.record(TimelineEntry::new(
        EventSource::Fiat,
        event.status.clone(),
        json!({
            "orderId": event.order_id,
            "sessionId": event.session_id,
            "partnerCustomerId": event.partner_customer_id,
            "txHash": event.tx_hash,
            "walletAddress": event.wallet_address,
            "walletAddressTag": event.wallet_address_tag,
            "cryptoAmount": event.crypto.amount,
            "depositStatus": proposed,
            "statusApplied": applied,
        }),
    ));

    transition
}

fn fill(slot: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}
