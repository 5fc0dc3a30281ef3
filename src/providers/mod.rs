// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound provider integrations.

pub mod token_cache;
pub mod transak;

pub use token_cache::{CachedToken, TokenCache};
pub use transak::{TransakClient, TransakError, WidgetSession, WidgetSessionRequest};
