// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit lifecycle states and the forward-only transition guard.
//!
//! ```text
//! INITIATED ─► PENDING ─► AWAITING_SETTLEMENT ─► SETTLED | FAILED | CANCELLED | EXPIRED | REFUNDED
//! ```
//!
//! Webhooks from both providers may arrive more than once and out of order.
//! A proposed status only takes effect when it ranks strictly above the
//! current one; terminal and review states never move again.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Deposit lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    /// Purchase session minted, user has not paid yet.
    Initiated,
    /// Fiat payment in progress at the purchase provider.
    Pending,
    /// Fiat leg completed, on-chain transfer not yet observed.
    AwaitingSettlement,
    /// On-chain transfer confirmed by the custodial provider.
    Settled,
    Failed,
    Cancelled,
    Expired,
    Refunded,
    /// Synthetic record: custodial event with no correlated deposit.
    UnmatchedCustodial,
    /// Synthetic record: custodial event matching several deposits.
    AmbiguousCustodial,
}

impl DepositStatus {
    /// Statuses a deposit can never leave.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DepositStatus::Settled
                | DepositStatus::Failed
                | DepositStatus::Cancelled
                | DepositStatus::Expired
                | DepositStatus::Refunded
        )
    }

    /// Synthetic records kept for manual review.
    pub fn is_review(self) -> bool {
        matches!(
            self,
            DepositStatus::UnmatchedCustodial | DepositStatus::AmbiguousCustodial
        )
    }

    /// In-flight statuses a custodial event may be correlated against.
    pub fn is_matchable(self) -> bool {
        matches!(
            self,
            DepositStatus::Initiated | DepositStatus::Pending | DepositStatus::AwaitingSettlement
        )
    }

    fn rank(self) -> u8 {
        match self {
            DepositStatus::Initiated => 0,
            DepositStatus::Pending => 1,
            DepositStatus::AwaitingSettlement => 2,
            DepositStatus::Settled
            | DepositStatus::Failed
            | DepositStatus::Cancelled
            | DepositStatus::Expired
            | DepositStatus::Refunded => 3,
            DepositStatus::UnmatchedCustodial | DepositStatus::AmbiguousCustodial => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DepositStatus::Initiated => "INITIATED",
            DepositStatus::Pending => "PENDING",
            DepositStatus::AwaitingSettlement => "AWAITING_SETTLEMENT",
            DepositStatus::Settled => "SETTLED",
            DepositStatus::Failed => "FAILED",
            DepositStatus::Cancelled => "CANCELLED",
            DepositStatus::Expired => "EXPIRED",
            DepositStatus::Refunded => "REFUNDED",
            DepositStatus::UnmatchedCustodial => "UNMATCHED_CUSTODIAL",
            DepositStatus::AmbiguousCustodial => "AMBIGUOUS_CUSTODIAL",
        }
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of offering a new status to a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The proposed status was applied.
    Advanced {
        from: DepositStatus,
        to: DepositStatus,
    },
    /// The deposit already has the proposed status.
    Unchanged(DepositStatus),
    /// The proposed status would move the deposit backwards or out of a
    /// final state, so the current status is kept.
    Held {
        current: DepositStatus,
        proposed: DepositStatus,
    },
}

impl Transition {
    /// Status the deposit ends up in.
    pub fn resulting_status(self) -> DepositStatus {
        match self {
            Transition::Advanced { to, .. } => to,
            Transition::Unchanged(status) => status,
            Transition::Held { current, .. } => current,
        }
    }

    pub fn is_applied(self) -> bool {
        matches!(self, Transition::Advanced { .. })
    }
}

/// Decide whether `proposed` may replace `current`.
pub fn advance(current: DepositStatus, proposed: DepositStatus) -> Transition {
    if current == proposed {
        return Transition::Unchanged(current);
    }
    if current.is_terminal() || current.is_review() || proposed.is_review() {
        return Transition::Held { current, proposed };
    }
    if proposed.rank() > current.rank() {
        Transition::Advanced {
            from: current,
            to: proposed,
        }
    } else {
        Transition::Held { current, proposed }
    }
}
