//! Course completion and certificates.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use poc_core::{
    address_key,
    certificate::{gateway_url, CertificateMetadata, CertificateModule, PinnedCertificate},
    rewards::certificate_allocation,
    ProgressError, TransactionKind, TransactionRecord, TransactionStatus,
};
use poc_indexer::storage::{CertificateRecord, StorageError, TransactionSource};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{flexible_u64, parse_address, require_address, synthetic_hash};
use crate::error::{
    internal_error, invalid_field, not_found, progress_error, storage_error, ApiJson, ApiQuery,
    ApiResult,
};
use crate::payouts::try_award_datacoins;
use crate::server::AppState;

const COMPLETION_REWARD_TAG: &str = "course_completion";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteCourseRequest {
    user_address: String,
    #[serde(deserialize_with = "flexible_u64")]
    course_id: u64,
    #[serde(default)]
    course_name: Option<String>,
    #[serde(default)]
    modules: Vec<CertificateModule>,
    #[serde(default)]
    stake_amount: Option<String>,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    block_number: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteCourseResponse {
    success: bool,
    cid: String,
    certificate_data: PinnedCertificate,
    gateway_url: String,
    data_coins_allocated: u64,
    transaction: TransactionRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    reward_transaction_hash: Option<String>,
}

/// Seal and pin a certificate, mark the course complete and allocate
/// DataCoins.
///
/// The learner must have staked and completed every module. Modules and the
/// course name default to the catalogue entry. Only the request that wins the
/// completion update mints the allocation.
pub async fn complete_course(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CompleteCourseRequest>,
) -> ApiResult<CompleteCourseResponse> {
    let user = parse_address("userAddress", &req.user_address)?;
    let course = state
        .storage
        .get_course(req.course_id)
        .await
        .map_err(internal_error)?;
    let progress = state
        .storage
        .get_progress(&user, req.course_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Learning progress not found"))?;

    if !progress.is_staked {
        return Err(progress_error(ProgressError::NotStaked));
    }
    if progress.course_completed {
        return Err(progress_error(ProgressError::CourseAlreadyCompleted));
    }
    if !progress.all_modules_completed() {
        return Err(progress_error(ProgressError::ModulesIncomplete {
            completed: progress.completed_modules,
            total: progress.total_modules(),
        }));
    }

    let modules = if req.modules.is_empty() {
        course
            .as_ref()
            .map(|c| {
                c.modules
                    .iter()
                    .map(|m| CertificateModule {
                        id: m.id,
                        title: m.title.clone(),
                        lessons: m.lessons,
                        duration: m.duration.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    } else {
        req.modules
    };
    if modules.is_empty() {
        return Err(invalid_field("modules", "modules are required"));
    }

    let course_name = req
        .course_name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| course.as_ref().map(|c| c.title.clone()))
        .ok_or_else(|| invalid_field("courseName", "courseName is required"))?;

    let stake_amount = req
        .stake_amount
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| progress.stake_amount.clone());

    let completed = Utc::now();
    let metadata = CertificateMetadata {
        student_address: address_key(&user),
        course_id: req.course_id.to_string(),
        course_name,
        completion_date: completed.format("%Y-%m-%d").to_string(),
        modules,
        stake_amount: stake_amount.clone(),
        completed_at: completed.to_rfc3339(),
    };

    let document = serde_json::to_value(&metadata).map_err(internal_error)?;
    let sealed = state
        .sealer
        .seal(&user, &document)
        .and_then(|sealed| Ok(serde_json::to_value(sealed)?))
        .map_err(internal_error)?;
    let cid = state
        .pinner
        .pin_json(&sealed)
        .await
        .map_err(internal_error)?;
    let certificate = PinnedCertificate {
        gateway_url: gateway_url(&cid),
        uploaded_at: Utc::now().to_rfc3339(),
        cid: cid.clone(),
        metadata,
    };

    let now = completed.timestamp();
    state
        .storage
        .update_progress_with(&user, req.course_id, |p| {
            p.mark_course_completed(Some(cid.clone()), now)
                .map_err(StorageError::from)
        })
        .await
        .map_err(storage_error)?;

    state
        .storage
        .insert_certificate(&user, req.course_id, &certificate)
        .await
        .map_err(internal_error)?;

    let tx = TransactionRecord {
        hash: req.transaction_hash.unwrap_or_else(synthetic_hash),
        kind: TransactionKind::Complete,
        amount: stake_amount,
        course_id: req.course_id.to_string(),
        timestamp: now,
        status: TransactionStatus::Success,
        block_number: req.block_number,
        certificate_cid: Some(cid.clone()),
        reason: None,
    };
    state
        .storage
        .insert_transaction(&user, &tx, TransactionSource::Api)
        .await
        .map_err(internal_error)?;

    let allocation = certificate_allocation(progress.total_modules() as usize);
    let awarded = try_award_datacoins(
        &state,
        user,
        allocation,
        &format!("Course {} completion", req.course_id),
        COMPLETION_REWARD_TAG,
        Some(req.course_id),
    )
    .await;

    info!(user = %user, course_id = req.course_id, cid = %cid, allocation, "Course completed");

    Ok(Json(CompleteCourseResponse {
        success: true,
        gateway_url: certificate.gateway_url.clone(),
        cid,
        data_coins_allocated: if awarded.is_some() { allocation } else { 0 },
        reward_transaction_hash: awarded.map(|(receipt, _)| receipt.tx_hash),
        certificate_data: certificate,
        transaction: tx,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatesQuery {
    user_address: Option<String>,
}

#[derive(Serialize)]
pub struct CertificatesResponse {
    certificates: Vec<CertificateRecord>,
}

pub async fn list_certificates(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CertificatesQuery>,
) -> ApiResult<CertificatesResponse> {
    let user = require_address("userAddress", query.user_address.as_deref())?;
    let certificates = state
        .storage
        .list_certificates(&user)
        .await
        .map_err(internal_error)?;
    Ok(Json(CertificatesResponse { certificates }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateOwnerQuery {
    user_address: Option<String>,
}

/// A certificate by CID, visible to its owner only.
pub async fn get_certificate(
    State(state): State<AppState>,
    Path(cid): Path<String>,
    ApiQuery(query): ApiQuery<CertificateOwnerQuery>,
) -> ApiResult<CertificateRecord> {
    let user = require_address("userAddress", query.user_address.as_deref())?;
    state
        .storage
        .get_certificate(&cid)
        .await
        .map_err(internal_error)?
        .filter(|record| record.user_address == user)
        .map(Json)
        .ok_or_else(|| not_found("Certificate not found"))
}
