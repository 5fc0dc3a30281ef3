// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit document model.
//!
//! One deposit ties a fiat purchase attempt to its eventual on-chain
//! settlement. The timeline is the audit trail and is append-only: the field
//! is private and only [`Deposit::record`] can extend it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::reconcile::DepositStatus;

/// How a deposit document came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositOrigin {
    /// Created by the session initiator for a user-started purchase.
    Session,
    /// Synthetic record preserving an uncorrelated custodial event.
    CustodialWebhook,
}

/// Which external system produced a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Fiat,
    Custodial,
}

/// Currency + amount pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Money {
    pub currency: String,
    pub amount: f64,
}

/// Custodial deposit address and correlation tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Destination {
    pub address: Option<String>,
    pub tag: Option<String>,
}

/// Amount as reported by a provider; either half may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReportedAmount {
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

/// State mirrored from the fiat purchase provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FiatProviderState {
    pub session_id: Option<String>,
    pub order_id: Option<String>,
    pub widget_url: Option<String>,
    /// Last provider status string, upper-cased.
    pub status: Option<String>,
    pub payment_method: Option<String>,
    pub partner_customer_id: Option<String>,
    pub referrer_domain: Option<String>,
    pub environment: Option<String>,
    pub tx_hash: Option<String>,
    pub wallet_address: Option<String>,
    pub wallet_address_tag: Option<String>,
    pub fiat: Option<ReportedAmount>,
    pub crypto: Option<ReportedAmount>,
    pub order_created_at: Option<String>,
    pub order_completed_at: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// State mirrored from the custodial wallet provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CustodialProviderState {
    pub transaction_id: Option<String>,
    pub tx_hash: Option<String>,
    pub status: Option<String>,
    pub sub_status: Option<String>,
    pub confirmations: Option<u64>,
    pub asset_id: Option<String>,
    pub amount: Option<f64>,
    /// `SANDBOX` or `PRODUCTION`.
    pub environment: Option<String>,
    pub last_updated: Option<i64>,
    pub event_received_at: Option<DateTime<Utc>>,
    /// Deposits an ambiguous event could have belonged to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidate_deposit_ids: Vec<String>,
    /// Raw provider event kept on synthetic records for manual review.
    #[schema(value_type = Option<Object>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<Value>,
}

/// One processed inbound event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub source: EventSource,
    /// Provider status as received (upper-cased).
    pub status: String,
    pub observed_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub details: Value,
}

impl TimelineEntry {
    pub fn new(source: EventSource, status: impl Into<String>, details: Value) -> Self {
        Self {
            source,
            status: status.into(),
            observed_at: Utc::now(),
            details,
        }
    }
}

/// Persisted deposit document.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    /// Store-generated opaque identifier.
    #[serde(rename = "id")]
    pub deposit_id: String,
    /// Owning user; `None` only on synthetic records whose tag resolved to nobody.
    pub user_id: Option<String>,
    pub status: DepositStatus,
    pub origin: DepositOrigin,
    pub asset: String,
    pub environment: String,
    /// Fiat amount requested at session creation.
    pub fiat: Option<Money>,
    /// Expected (or observed) crypto amount.
    pub crypto: Option<Money>,
    pub destination: Destination,
    pub fiat_provider: FiatProviderState,
    pub custodial_provider: CustodialProviderState,
    timeline: Vec<TimelineEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deposit {
    /// Build a deposit for a freshly minted purchase session.
    pub fn initiated(
        user_id: String,
        asset: String,
        environment: String,
        fiat: Money,
        crypto: Option<Money>,
        destination: Destination,
        fiat_provider: FiatProviderState,
    ) -> Self {
        Self::blank(
            Some(user_id),
            DepositStatus::Initiated,
            DepositOrigin::Session,
            asset,
            environment,
        )
        .with_amounts(Some(fiat), crypto)
        .with_destination(destination)
        .with_fiat_provider(fiat_provider)
    }

    /// Empty document with a fresh ID. Callers fill in the provider state.
    pub fn blank(
        user_id: Option<String>,
        status: DepositStatus,
        origin: DepositOrigin,
        asset: String,
        environment: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            deposit_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            status,
            origin,
            asset,
            environment,
            fiat: None,
            crypto: None,
            destination: Destination::default(),
            fiat_provider: FiatProviderState::default(),
            custodial_provider: CustodialProviderState::default(),
            timeline: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_amounts(mut self, fiat: Option<Money>, crypto: Option<Money>) -> Self {
        self.fiat = fiat;
        self.crypto = crypto;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_fiat_provider(mut self, state: FiatProviderState) -> Self {
        self.fiat_provider = state;
        self
    }

    pub fn with_custodial_provider(mut self, state: CustodialProviderState) -> Self {
        self.custodial_provider = state;
        self
    }

    /// Audit trail in arrival order.
    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    /// Append a processed event to the timeline.
    pub fn record(&mut self, entry: TimelineEntry) {
        self.updated_at = entry.observed_at;
        self.timeline.push(entry);
    }

    /// Crypto amount a custodial transfer is expected to carry, if known.
    pub fn expected_crypto_amount(&self) -> Option<f64> {
        self.crypto.as_ref().map(|money| money.amount)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}
