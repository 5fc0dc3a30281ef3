// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::{auth::Auth, error::ApiError, state::AppState, storage::Deposit};

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositListResponse {
    /// Newest first.
    pub deposits: Vec<Deposit>,
    pub total: usize,
}

/// List the caller's deposits.
#[utoipa::path(
    get,
    path = "/v1/deposits",
    tag = "Deposits",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's deposits, newest first", body = DepositListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_deposits(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<DepositListResponse>, ApiError> {
    let deposits = state.deposits.list_by_owner(&user.user_id).map_err(|e| {
        error!(user_id = %user.user_id, error = %e, "Failed to list deposits");
        ApiError::internal("internal_error")
    })?;
    let total = deposits.len();
    Ok(Json(DepositListResponse { deposits, total }))
}

/// Fetch one of the caller's deposits.
#[utoipa::path(
    get,
    path = "/v1/deposits/{deposit_id}",
    tag = "Deposits",
    security(("bearer_auth" = [])),
    params(
        ("deposit_id" = String, Path, description = "Deposit ID")
    ),
    responses(
        (status = 200, description = "Deposit", body = Deposit),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "Deposit not found")
    )
)]
pub async fn get_deposit(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(deposit_id): Path<String>,
) -> Result<Json<Deposit>, ApiError> {
    let deposit = state
        .deposits
        .get_deposit(&deposit_id)
        .map_err(|e| {
            error!(deposit_id = %deposit_id, error = %e, "Failed to read deposit");
            ApiError::internal("internal_error")
        })?
        .ok_or_else(|| ApiError::not_found("deposit_not_found"))?;

    if !deposit.is_owned_by(&user.user_id) {
        return Err(ApiError::forbidden("forbidden"));
    }
    Ok(Json(deposit))
}
