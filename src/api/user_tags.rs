// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-user destination tags.
//!
//! Every user gets one random 8-digit tag on the shared custodial deposit
//! address. Tags are claimed once and never reassigned.

use axum::{extract::State, Json};
use rand::Rng;
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    state::AppState,
    storage::{DepositDatabase, TagClaim},
};

/// Claim attempts before giving up on a collision streak.
const MAX_ALLOCATION_ATTEMPTS: usize = 20;

const TAG_RANGE: std::ops::Range<u32> = 10_000_000..100_000_000;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserTagResponse {
    pub ok: bool,
    pub user_tag: String,
    /// True when the tag was allocated by an earlier call.
    pub existed: bool,
}

/// The user's tag and whether it already existed.
pub fn ensure_user_tag(deposits: &DepositDatabase, user_id: &str) -> Result<(String, bool), ApiError> {
    let existing = deposits.user_tag(user_id).map_err(|e| {
        error!(user_id, error = %e, "Failed to read user tag");
        ApiError::internal("internal_error")
    })?;
    if let Some(tag) = existing {
        return Ok((tag, true));
    }

    let mut rng = rand::rng();
    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
        let candidate = rng.random_range(TAG_RANGE).to_string();
        let claim = deposits.claim_user_tag(user_id, &candidate).map_err(|e| {
            error!(user_id, error = %e, "Failed to claim user tag");
            ApiError::internal("internal_error")
        })?;
        match claim {
            TagClaim::Claimed(tag) => {
                info!(user_id, destination_tag = %tag, attempt, "Allocated destination tag");
                return Ok((tag, false));
            }
            // Lost a race with a concurrent request for the same user.
            TagClaim::AlreadyOwned(tag) => return Ok((tag, true)),
            TagClaim::Collision => {
                warn!(user_id, destination_tag = %candidate, attempt, "Destination tag collision");
            }
        }
    }

    error!(user_id, "Destination tag allocation exhausted its attempts");
    Err(ApiError::internal("allocation_failed"))
}

/// Allocate (or return) the caller's destination tag.
#[utoipa::path(
    post,
    path = "/v1/user-tag",
    tag = "Deposits",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's destination tag", body = UserTagResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Allocation failed")
    )
)]
pub async fn create_user_tag(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<UserTagResponse>, ApiError> {
    let (user_tag, existed) = ensure_user_tag(&state.deposits, &user.user_id)?;
    Ok(Json(UserTagResponse {
        ok: true,
        user_tag,
        existed,
    }))
}
