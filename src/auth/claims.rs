// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::Deserialize;

/// Claims read from an identity token.
///
/// Only `sub` is mandatory. Identity providers differ on the rest.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Expiration timestamp
    #[serde(default)]
    pub exp: i64,

    #[serde(default)]
    pub iss: String,

    #[serde(default)]
    pub email: Option<String>,

    /// Audience (validated by jsonwebtoken, not read directly)
    #[serde(default)]
    #[allow(dead_code)]
    pub aud: Option<serde_json::Value>,
}

/// The verified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Canonical user ID (`sub` claim)
    pub user_id: String,
    /// Prefilled into the purchase widget when present
    pub email: Option<String>,
    pub issuer: String,
    /// Token expiration (Unix timestamp)
    pub expires_at: i64,
}

impl From<IdentityClaims> for AuthenticatedUser {
    fn from(claims: IdentityClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email.filter(|email| !email.trim().is_empty()),
            issuer: claims.iss,
            expires_at: claims.exp,
        }
    }
}
