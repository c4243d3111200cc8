//! Reward progress: module rewards and milestone payouts.

use axum::{extract::State, Json};
use poc_core::{
    Address, CourseProgressView, LearningProgress, RewardType, TransactionKind, DEFAULT_TOTAL_MODULES,
};
use poc_indexer::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use super::{flexible_opt_u32, flexible_opt_u64, now, parse_address, require_address};
use crate::error::{
    internal_error, invalid_field, storage_error, ApiError, ApiJson, ApiQuery, ApiResult,
};
use crate::payouts::{mint_datacoins, record_award};
use crate::server::AppState;

const UNSTAKED_AMOUNT: &str = "0";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardProgressQuery {
    user_address: Option<String>,
    course_id: Option<u64>,
    total_modules: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressResponse {
    success: bool,
    progress: CourseProgressView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneSummary {
    reason: String,
    count: usize,
    total: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummaryResponse {
    success: bool,
    total_progress_rewards: f64,
    reward_count: usize,
    milestones: Vec<MilestoneSummary>,
    courses: Vec<CourseProgressView>,
}

/// Load the user's progress for a course, creating an unstaked record when
/// none exists. The module count comes from the request, then the course
/// catalogue, then the default.
async fn ensure_course_progress(
    state: &AppState,
    user: Address,
    course_id: u64,
    total_modules: Option<u32>,
) -> Result<LearningProgress, ApiError> {
    let total = match total_modules {
        Some(total) => total,
        None => state
            .storage
            .get_course(course_id)
            .await
            .map_err(internal_error)?
            .map(|c| c.total_modules())
            .unwrap_or(DEFAULT_TOTAL_MODULES),
    };

    let initial = LearningProgress::enroll(user, course_id, UNSTAKED_AMOUNT, false, total, now())
        .map_err(|e| invalid_field("totalModules", e.to_string()))?;
    state
        .storage
        .ensure_progress(&initial)
        .await
        .map_err(storage_error)
}

/// Course reward progress when `courseId` is given, otherwise a summary of
/// every DataCoin reward the user has received.
pub async fn get_progress(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RewardProgressQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_address("userAddress", query.user_address.as_deref())?;

    let body = match query.course_id {
        Some(course_id) => {
            let progress =
                ensure_course_progress(&state, user, course_id, query.total_modules).await?;
            serde_json::to_value(CourseProgressResponse {
                success: true,
                progress: progress.course_view(),
            })
        }
        None => serde_json::to_value(progress_summary(&state, user).await?),
    }
    .map_err(internal_error)?;

    Ok(Json(body))
}

async fn progress_summary(
    state: &AppState,
    user: Address,
) -> Result<ProgressSummaryResponse, ApiError> {
    let rewards = state
        .storage
        .list_transactions_by_kind(&user, TransactionKind::Datacoin)
        .await
        .map_err(internal_error)?;

    let mut grouped: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    for tx in &rewards {
        let key = tx.reason.clone().unwrap_or_else(|| "other".to_string());
        let entry = grouped.entry(key).or_default();
        entry.0 += 1;
        entry.1 += tx.amount_f64();
    }

    let courses = state
        .storage
        .list_progress_for_user(&user)
        .await
        .map_err(internal_error)?
        .iter()
        .map(LearningProgress::course_view)
        .collect();

    Ok(ProgressSummaryResponse {
        success: true,
        total_progress_rewards: rewards.iter().map(|tx| tx.amount_f64()).sum(),
        reward_count: rewards.len(),
        milestones: grouped
            .into_iter()
            .map(|(reason, (count, total))| MilestoneSummary {
                reason,
                count,
                total,
            })
            .collect(),
        courses,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRewardRequest {
    user_address: String,
    reward_type: String,
    #[serde(default, deserialize_with = "flexible_opt_u64")]
    course_id: Option<u64>,
    #[serde(default, deserialize_with = "flexible_opt_u32")]
    module_id: Option<u32>,
    #[serde(default, deserialize_with = "flexible_opt_u32")]
    total_modules: Option<u32>,
    #[serde(default)]
    streak_days: Option<u32>,
    #[serde(default)]
    milestone: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardDetails {
    amount: u64,
    token_address: Address,
    timestamp: i64,
    transaction_hash: String,
    reward_type: RewardType,
    #[serde(skip_serializing_if = "Option::is_none")]
    course_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress_percentage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    streak_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    milestone: Option<String>,
    simulated: bool,
}

#[derive(Serialize)]
pub struct ClaimRewardResponse {
    success: bool,
    reward: RewardDetails,
    message: String,
}

/// Mint a progress reward.
///
/// With `courseId` and `moduleId` the module is completed if needed and its
/// reward is claimed before minting, so a module pays out at most once. Only
/// a failed mint releases the claim.
pub async fn claim_progress_reward(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ClaimRewardRequest>,
) -> ApiResult<ClaimRewardResponse> {
    let user = parse_address("userAddress", &req.user_address)?;
    let reward_type: RewardType = req
        .reward_type
        .parse()
        .map_err(|e: poc_core::CoreError| invalid_field("rewardType", e.to_string()))?;
    let amount = reward_type.amount();

    let module_claim = match (req.course_id, req.module_id) {
        (Some(course_id), Some(module_id)) => Some((course_id, module_id)),
        _ => None,
    };

    let progress_percentage = if let Some((course_id, module_id)) = module_claim {
        ensure_course_progress(&state, user, course_id, req.total_modules).await?;
        let (progress, _) = state
            .storage
            .update_progress_with(&user, course_id, |p| {
                p.claim_module_reward(module_id, amount, now())
                    .map_err(StorageError::from)
            })
            .await
            .map_err(storage_error)?;
        Some(progress.percentage())
    } else {
        None
    };

    let reason = match (module_claim, &req.milestone) {
        (Some((_, module_id)), _) => format!("Module {} completion reward", module_id),
        (None, Some(milestone)) => milestone.clone(),
        (None, None) => reward_type.as_str().to_string(),
    };

    let receipt = match mint_datacoins(&state, user, amount, &reason).await {
        Ok(receipt) => receipt,
        Err(e) => {
            if let Some((course_id, module_id)) = module_claim {
                let released = state
                    .storage
                    .update_progress_with(&user, course_id, |p| {
                        p.release_module_reward(module_id, now())
                            .map_err(StorageError::from)
                    })
                    .await;
                if let Err(release_err) = released {
                    warn!(
                        user = %user,
                        course_id,
                        module_id,
                        "Failed to release reward claim: {}",
                        release_err
                    );
                }
            }
            return Err(internal_error(e));
        }
    };

    // Minted: the claim stays held whatever happens to the bookkeeping below.
    if let Some((course_id, module_id)) = module_claim {
        let hash = receipt.tx_hash.clone();
        let settled = state
            .storage
            .update_progress_with(&user, course_id, |p| {
                p.settle_module_reward(module_id, hash.clone(), now())
                    .map_err(StorageError::from)
            })
            .await;
        if let Err(e) = settled {
            error!(
                user = %user,
                course_id,
                module_id,
                tx_hash = %receipt.tx_hash,
                "Failed to record reward transaction on progress: {}",
                e
            );
        }
    }

    let tx = record_award(
        &state,
        user,
        amount,
        &receipt,
        reward_type.as_str(),
        req.course_id,
    )
    .await;

    info!(
        user = %user,
        reward_type = %reward_type,
        amount,
        tx_hash = %receipt.tx_hash,
        "Progress reward minted"
    );

    Ok(Json(ClaimRewardResponse {
        success: true,
        message: format!("Earned {} DataCoins for {}", amount, reason),
        reward: RewardDetails {
            amount,
            token_address: receipt.token_address,
            timestamp: tx.timestamp,
            transaction_hash: receipt.tx_hash,
            reward_type,
            course_id: req.course_id,
            module_id: req.module_id,
            progress_percentage,
            streak_days: req.streak_days,
            milestone: req.milestone,
            simulated: receipt.simulated,
        },
    }))
}
