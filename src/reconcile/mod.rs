// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit reconciliation core.
//!
//! - [`lifecycle`]: deposit statuses and the forward-only transition guard
//! - [`payload`]: webhook body normalization shared by both providers
//! - [`fiat`]: fiat purchase events, exact order/session correlation
//! - [`custodial`]: custodial transfer events and synthetic review records
//! - [`matching`]: tag + amount correlation heuristic

pub mod custodial;
pub mod fiat;
pub mod lifecycle;
pub mod matching;
pub mod payload;

pub use custodial::{
    apply_custodial_event, custodial_environment, synthetic_record, CustodialEvent,
    CustodialStatusClass,
};
pub use fiat::{apply_fiat_event, map_fiat_status, FiatEvent};
pub use lifecycle::{advance, DepositStatus, Transition};
pub use matching::{amount_matches, correlate, CandidateMatch, AMOUNT_TOLERANCE};
pub use payload::PayloadError;
