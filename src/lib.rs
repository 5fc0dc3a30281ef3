// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit Reconciler - fiat purchase to custodial settlement
//!
//! Ties a fiat purchase session and the custodial on-chain transfer that
//! settles it into one deposit record, driven by provider webhooks.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers (Axum): session creation, webhooks, deposit reads
//! - `auth` - Bearer identity verification (JWKS)
//! - `providers` - Fiat purchase provider client and token cache
//! - `reconcile` - Status mapping, forward-only guard, tag + amount matching
//! - `storage` - Deposit documents on an embedded redb store

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod providers;
pub mod reconcile;
pub mod state;
pub mod storage;
