// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Deposit Storage
//!
//! Deposit documents and the embedded redb store that holds them.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   deposits.redb   # deposits, secondary indexes, destination tags
//! ```
//!
//! Documents are stored as JSON so the on-disk shape is the same camelCase
//! shape the API returns.

pub mod database;
pub mod deposits;

pub use database::{
    CustodialOutcome, DepositDatabase, DepositDbError, DepositDbResult, FiatOutcome, TagClaim,
    UnmatchedReason,
};
pub use deposits::{
    CustodialProviderState, Deposit, DepositOrigin, Destination, EventSource, FiatProviderState,
    Money, ReportedAmount, TimelineEntry,
};
