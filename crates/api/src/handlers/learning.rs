//! Enrollment and the learning-progress state machine.

use axum::{extract::State, http::StatusCode, Json};
use poc_core::{
    rewards::parse_token_amount, LearningProgress, TransactionKind, TransactionRecord,
    TransactionStatus,
};
use poc_indexer::storage::{StorageError, TransactionSource};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{flexible_u32, flexible_u64, now, parse_address, require_address, require_text, synthetic_hash};
use crate::error::{
    internal_error, invalid_field, not_found, storage_error, ApiError, ApiJson, ApiQuery,
    ApiResult,
};
use crate::server::AppState;

/// Progress record plus its completion percentage.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    #[serde(flatten)]
    progress: LearningProgress,
    progress_percentage: u32,
    verified_assignments: usize,
}

impl From<LearningProgress> for ProgressResponse {
    fn from(progress: LearningProgress) -> Self {
        Self {
            progress_percentage: progress.percentage(),
            verified_assignments: progress.verified_assignments(),
            progress,
        }
    }
}

#[derive(Serialize)]
pub struct ProgressListResponse {
    progress: Vec<ProgressResponse>,
}

#[derive(Serialize)]
pub struct ProgressWithTransaction {
    success: bool,
    progress: ProgressResponse,
    transaction: TransactionRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeRequest {
    user_address: String,
    #[serde(deserialize_with = "flexible_u64")]
    course_id: u64,
    #[serde(default)]
    stake_amount: Option<String>,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    block_number: Option<u64>,
}

/// Enroll after an on-chain stake and log it. An existing unstaked record is
/// upgraded in place; a second stake is a conflict.
pub async fn stake(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<StakeRequest>,
) -> Result<(StatusCode, Json<ProgressWithTransaction>), ApiError> {
    let user = parse_address("userAddress", &req.user_address)?;
    let course = state
        .storage
        .get_course(req.course_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found(format!("Course {} not found", req.course_id)))?;

    let stake_amount = req
        .stake_amount
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| course.stake_amount.clone());
    parse_token_amount(&stake_amount).map_err(|e| invalid_field("stakeAmount", e.to_string()))?;

    let now = now();
    let initial = LearningProgress::enroll(
        user,
        course.id,
        stake_amount.clone(),
        true,
        course.total_modules(),
        now,
    )
    .map_err(|e| storage_error(e.into()))?;
    // A record may already exist unstaked, created by a reward progress read.
    let progress = match state.storage.create_progress(&initial).await {
        Ok(progress) => progress,
        Err(StorageError::Conflict(_)) => {
            let amount = stake_amount.clone();
            let (progress, ()) = state
                .storage
                .update_progress_with(&user, course.id, |p| {
                    p.record_stake(amount.clone(), now).map_err(StorageError::from)
                })
                .await
                .map_err(storage_error)?;
            progress
        }
        Err(e) => return Err(storage_error(e)),
    };

    let tx = TransactionRecord {
        hash: req.transaction_hash.unwrap_or_else(synthetic_hash),
        kind: TransactionKind::Stake,
        amount: stake_amount,
        course_id: course.id.to_string(),
        timestamp: now,
        status: TransactionStatus::Success,
        block_number: req.block_number,
        certificate_cid: None,
        reason: None,
    };
    state
        .storage
        .insert_transaction(&user, &tx, TransactionSource::Api)
        .await
        .map_err(internal_error)?;

    info!(user = %user, course_id = course.id, amount = %tx.amount, "Enrolled after stake");
    Ok((
        StatusCode::CREATED,
        Json(ProgressWithTransaction {
            success: true,
            progress: progress.into(),
            transaction: tx,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    user_address: Option<String>,
    course_id: Option<u64>,
}

/// One record when `courseId` is given, otherwise every record of the user.
pub async fn get_learning_progress(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProgressQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_address("userAddress", query.user_address.as_deref())?;

    let body = match query.course_id {
        Some(course_id) => {
            let progress = state
                .storage
                .get_progress(&user, course_id)
                .await
                .map_err(internal_error)?
                .ok_or_else(|| not_found("Learning progress not found"))?;
            serde_json::to_value(ProgressResponse::from(progress))
        }
        None => {
            let progress = state
                .storage
                .list_progress_for_user(&user)
                .await
                .map_err(internal_error)?;
            serde_json::to_value(ProgressListResponse {
                progress: progress.into_iter().map(Into::into).collect(),
            })
        }
    }
    .map_err(internal_error)?;

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteModuleRequest {
    user_address: String,
    #[serde(deserialize_with = "flexible_u64")]
    course_id: u64,
    #[serde(deserialize_with = "flexible_u32")]
    module_id: u32,
}

pub async fn complete_module(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CompleteModuleRequest>,
) -> ApiResult<ProgressResponse> {
    let user = parse_address("userAddress", &req.user_address)?;
    let now = now();

    let (progress, ()) = state
        .storage
        .update_progress_with(&user, req.course_id, |p| {
            p.complete_module(req.module_id, now).map_err(StorageError::from)
        })
        .await
        .map_err(storage_error)?;

    info!(
        user = %user,
        course_id = req.course_id,
        module_id = req.module_id,
        completed = progress.completed_modules,
        "Module completed"
    );
    Ok(Json(progress.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAssignmentRequest {
    user_address: String,
    #[serde(deserialize_with = "flexible_u64")]
    course_id: u64,
    assignment_id: String,
    submission_url: String,
}

pub async fn submit_assignment(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SubmitAssignmentRequest>,
) -> ApiResult<ProgressResponse> {
    let user = parse_address("userAddress", &req.user_address)?;
    let assignment_id = require_text("assignmentId", &req.assignment_id)?.to_string();
    let submission_url = require_text("submissionUrl", &req.submission_url)?.to_string();

    if let Some(course) = state
        .storage
        .get_course(req.course_id)
        .await
        .map_err(internal_error)?
    {
        if !course.has_assignment(&assignment_id) {
            return Err(not_found(format!(
                "Assignment {} not found in course {}",
                assignment_id, req.course_id
            )));
        }
    }

    let now = now();
    let (progress, ()) = state
        .storage
        .update_progress_with(&user, req.course_id, |p| {
            p.submit_assignment(assignment_id.clone(), submission_url.clone(), now);
            Ok(())
        })
        .await
        .map_err(storage_error)?;

    Ok(Json(progress.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAssignmentRequest {
    user_address: String,
    #[serde(deserialize_with = "flexible_u64")]
    course_id: u64,
    assignment_id: String,
    verified_by: String,
    #[serde(default)]
    feedback: Option<String>,
}

pub async fn verify_assignment(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyAssignmentRequest>,
) -> ApiResult<ProgressResponse> {
    let user = parse_address("userAddress", &req.user_address)?;
    let verified_by = require_text("verifiedBy", &req.verified_by)?.to_string();
    let now = now();

    let (progress, ()) = state
        .storage
        .update_progress_with(&user, req.course_id, |p| {
            p.verify_assignment(&req.assignment_id, verified_by.clone(), req.feedback.clone(), now)
                .map_err(StorageError::from)
        })
        .await
        .map_err(storage_error)?;

    Ok(Json(progress.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    user_address: String,
    #[serde(deserialize_with = "flexible_u64")]
    course_id: u64,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    block_number: Option<u64>,
}

/// Mark the stake returned and log the refund.
pub async fn refund_stake(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefundRequest>,
) -> ApiResult<ProgressWithTransaction> {
    let user = parse_address("userAddress", &req.user_address)?;
    let now = now();

    let (progress, ()) = state
        .storage
        .update_progress_with(&user, req.course_id, |p| {
            p.mark_stake_returned(now).map_err(StorageError::from)
        })
        .await
        .map_err(storage_error)?;

    let tx = TransactionRecord {
        hash: req.transaction_hash.unwrap_or_else(synthetic_hash),
        kind: TransactionKind::Refund,
        amount: progress.stake_amount.clone(),
        course_id: req.course_id.to_string(),
        timestamp: now,
        status: TransactionStatus::Success,
        block_number: req.block_number,
        certificate_cid: None,
        reason: None,
    };
    state
        .storage
        .insert_transaction(&user, &tx, TransactionSource::Api)
        .await
        .map_err(internal_error)?;

    Ok(Json(ProgressWithTransaction {
        success: true,
        progress: progress.into(),
        transaction: tx,
    }))
}

#[derive(Serialize)]
pub struct DeleteProgressResponse {
    deleted: bool,
}

pub async fn delete_learning_progress(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProgressQuery>,
) -> ApiResult<DeleteProgressResponse> {
    let user = require_address("userAddress", query.user_address.as_deref())?;
    let course_id = query
        .course_id
        .ok_or_else(|| invalid_field("courseId", "courseId is required"))?;

    let deleted = state
        .storage
        .delete_progress(&user, course_id)
        .await
        .map_err(internal_error)?;
    if !deleted {
        return Err(not_found("Learning progress not found"));
    }
    info!(user = %user, course_id, "Learning progress deleted");
    Ok(Json(DeleteProgressResponse { deleted }))
}
