// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tag + amount correlation of custodial transfers to deposits.
//!
//! The custodial provider never echoes our deposit ID. A transfer is
//! attributed by destination tag, narrowed by an absolute amount tolerance.
//! Candidates without an expected crypto amount match on tag alone.

use crate::storage::Deposit;

/// Absolute tolerance, in asset units, between expected and observed amounts.
pub const AMOUNT_TOLERANCE: f64 = 0.0001;

/// Absorbs binary representation error so the boundary stays inclusive.
const FLOAT_SLACK: f64 = 1e-12;

/// Correlation result for one custodial transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateMatch {
    None,
    Single(String),
    /// Every matching deposit ID, in index order.
    Ambiguous(Vec<String>),
}

/// Whether an observed amount satisfies a deposit's expectation.
pub fn amount_matches(expected: Option<f64>, observed: Option<f64>) -> bool {
    match (expected, observed) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(expected), Some(observed)) => {
            (expected - observed).abs() <= AMOUNT_TOLERANCE + FLOAT_SLACK
        }
    }
}

/// Pick the in-flight deposits carrying `tag` whose expected amount matches.
pub fn correlate<'a>(
    deposits: impl IntoIterator<Item = &'a Deposit>,
    tag: &str,
    observed: Option<f64>,
) -> CandidateMatch {
    let mut ids: Vec<String> = deposits
        .into_iter()
        .filter(|deposit| deposit.status.is_matchable())
        .filter(|deposit| deposit.destination.tag.as_deref() == Some(tag))
        .filter(|deposit| amount_matches(deposit.expected_crypto_amount(), observed))
        .map(|deposit| deposit.deposit_id.clone())
        .collect();

    match ids.len() {
        0 => CandidateMatch::None,
        1 => CandidateMatch::Single(ids.remove(0)),
        _ => CandidateMatch::Ambiguous(ids),
    }
}
