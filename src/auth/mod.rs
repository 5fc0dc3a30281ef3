// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication
//!
//! Bearer identity tokens for the user-facing endpoints (`/session`,
//! `/v1/*`). Webhooks do not use this module.
//!
//! ## Flow
//!
//! 1. The frontend signs the user in with the identity provider
//! 2. It sends `Authorization: Bearer <JWT>`
//! 3. The server:
//!    - fetches the provider's JWKS over HTTPS (cached for five minutes)
//!    - verifies signature, expiry, issuer and audience (60 s leeway)
//!    - takes `sub` as the canonical `user_id` and `email` for the widget

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::Auth;
pub use jwks::JwksManager;
