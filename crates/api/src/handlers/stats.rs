use axum::{
    extract::{Path, State},
    Json,
};
use poc_core::stats::{
    leaderboard as rank_users, user_stats as derive_stats, LeaderboardEntry, UserStats,
};
use poc_core::Address;
use poc_indexer::reputation::ReputationSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{now, parse_address};
use crate::error::{
    internal_error, service_unavailable, upstream_error, ApiError, ApiQuery, ApiResult,
};
use crate::server::AppState;

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Reputation, SBT counts and the activity feed of one user.
pub async fn user_stats(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<UserStats> {
    let user = parse_address("address", &address)?;
    let txs = state
        .storage
        .list_transactions(&user)
        .await
        .map_err(internal_error)?;
    Ok(Json(derive_stats(&txs, now())))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
pub struct LeaderboardResponse {
    leaderboard: Vec<LeaderboardEntry>,
}

pub async fn leaderboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LeaderboardQuery>,
) -> ApiResult<LeaderboardResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT);

    let users = state
        .storage
        .list_transaction_users()
        .await
        .map_err(internal_error)?;

    let mut rows = Vec::with_capacity(users.len());
    for user in users {
        let txs = state
            .storage
            .list_transactions(&user)
            .await
            .map_err(internal_error)?;
        rows.push((user, txs));
    }

    Ok(Json(LeaderboardResponse {
        leaderboard: rank_users(rows, limit),
    }))
}

fn reputation_source(state: &AppState) -> Result<Arc<dyn ReputationSource>, ApiError> {
    state
        .reputation
        .clone()
        .ok_or_else(|| service_unavailable("Reputation contract is not configured"))
}

/// On-chain leaderboard, scores as decimal strings.
#[derive(Serialize)]
pub struct ReputationLeaderboard {
    addrs: Vec<Address>,
    scores: Vec<String>,
}

/// Top contributors as ranked by the Reputation contract.
pub async fn reputation_leaderboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LeaderboardQuery>,
) -> ApiResult<ReputationLeaderboard> {
    let source = reputation_source(&state)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT);

    let top = source
        .top_contributors(limit as u64)
        .await
        .map_err(upstream_error)?;
    let (addrs, scores) = top
        .into_iter()
        .map(|entry| (entry.address, entry.score.to_string()))
        .unzip();
    Ok(Json(ReputationLeaderboard { addrs, scores }))
}

#[derive(Serialize)]
pub struct ReputationScoreResponse {
    address: Address,
    score: String,
}

/// On-chain reputation of one wallet.
pub async fn reputation_score(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<ReputationScoreResponse> {
    let user = parse_address("address", &address)?;
    let source = reputation_source(&state)?;
    let score = source.score(user).await.map_err(upstream_error)?;
    Ok(Json(ReputationScoreResponse {
        address: user,
        score: score.to_string(),
    }))
}
