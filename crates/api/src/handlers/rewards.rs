use axum::{extract::State, Json};
use poc_core::{CourseDifficulty, TransactionKind, TransactionRecord};
use poc_indexer::storage::StorageError;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{flexible_u64, now, parse_address, require_address};
use crate::error::{
    internal_error, invalid_field, storage_error, ApiJson, ApiQuery, ApiResult,
};
use crate::payouts::{mint_datacoins, record_award};
use crate::server::AppState;

const COURSE_REWARD_TAG: &str = "course_completion";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRewardRequest {
    user_address: String,
    #[serde(deserialize_with = "flexible_u64")]
    course_id: u64,
    difficulty: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRewardResponse {
    success: bool,
    amount: u64,
    difficulty: CourseDifficulty,
    transaction_hash: String,
    simulated: bool,
}

/// Difficulty-based course completion reward.
///
/// Paid once per completed course: the reward is claimed on the progress
/// record before minting and released again if the mint fails.
pub async fn course_reward(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CourseRewardRequest>,
) -> ApiResult<CourseRewardResponse> {
    let user = parse_address("userAddress", &req.user_address)?;
    let difficulty: CourseDifficulty = req
        .difficulty
        .parse()
        .map_err(|e: poc_core::CoreError| invalid_field("difficulty", e.to_string()))?;
    let amount = difficulty.completion_reward();

    state
        .storage
        .update_progress_with(&user, req.course_id, |p| {
            p.claim_completion_reward(now()).map_err(StorageError::from)
        })
        .await
        .map_err(storage_error)?;

    let reason = format!("{} course {} completed", difficulty.as_str(), req.course_id);
    let receipt = match mint_datacoins(&state, user, amount, &reason).await {
        Ok(receipt) => receipt,
        Err(e) => {
            let released = state
                .storage
                .update_progress_with(&user, req.course_id, |p| {
                    p.release_completion_reward(now());
                    Ok(())
                })
                .await;
            if let Err(release_err) = released {
                warn!(
                    user = %user,
                    course_id = req.course_id,
                    "Failed to release completion reward claim: {}",
                    release_err
                );
            }
            return Err(internal_error(e));
        }
    };
    record_award(
        &state,
        user,
        amount,
        &receipt,
        COURSE_REWARD_TAG,
        Some(req.course_id),
    )
    .await;

    Ok(Json(CourseRewardResponse {
        success: true,
        amount,
        difficulty,
        transaction_hash: receipt.tx_hash,
        simulated: receipt.simulated,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsQuery {
    user_address: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsResponse {
    rewards: Vec<TransactionRecord>,
    total_earned: f64,
}

/// DataCoin reward history.
pub async fn list_rewards(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RewardsQuery>,
) -> ApiResult<RewardsResponse> {
    let user = require_address("userAddress", query.user_address.as_deref())?;
    let rewards = state
        .storage
        .list_transactions_by_kind(&user, TransactionKind::Datacoin)
        .await
        .map_err(internal_error)?;
    let total_earned = rewards.iter().map(|tx| tx.amount_f64()).sum();
    Ok(Json(RewardsResponse {
        rewards,
        total_earned,
    }))
}
