use axum::{extract::State, http::StatusCode, Json};
use poc_core::{Address, TransactionKind, TransactionRecord, TransactionStatus};
use poc_indexer::{listener::backfill_user, storage::TransactionSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{now, parse_address, require_address, synthetic_hash};
use crate::error::{internal_error, invalid_field, ApiError, ApiJson, ApiQuery, ApiResult};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    user_address: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Serialize)]
pub struct TransactionsResponse {
    transactions: Vec<TransactionRecord>,
}

/// Transactions of a user, newest first.
///
/// An empty log triggers a gated on-chain backfill before answering.
pub async fn list_transactions(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TransactionsQuery>,
) -> ApiResult<TransactionsResponse> {
    let user = require_address("userAddress", query.user_address.as_deref())?;
    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<TransactionKind>)
        .transpose()
        .map_err(|e| invalid_field("type", e.to_string()))?;

    let mut transactions = state
        .storage
        .list_transactions(&user)
        .await
        .map_err(internal_error)?;

    if transactions.is_empty() && maybe_backfill(&state, user).await {
        transactions = state
            .storage
            .list_transactions(&user)
            .await
            .map_err(internal_error)?;
    }

    if let Some(kind) = kind {
        transactions.retain(|tx| tx.kind == kind);
    }
    Ok(Json(TransactionsResponse { transactions }))
}

/// Run a backfill unless one is in flight or ran recently. Returns whether
/// new rows were stored.
async fn maybe_backfill(state: &AppState, user: Address) -> bool {
    let Some(source) = state.history.clone() else {
        return false;
    };
    let Some(_permit) = state.backfill_gate.try_begin(user) else {
        debug!(user = %user, "Backfill skipped (in flight or cooling down)");
        return false;
    };

    let result = backfill_user(source.as_ref(), &state.storage, user, state.lookback_blocks).await;

    match result {
        Ok(stored) => stored > 0,
        Err(e) => {
            warn!(user = %user, "On-chain backfill failed: {:#}", e);
            false
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransactionRequest {
    user_address: String,
    #[serde(rename = "type")]
    kind: TransactionKind,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    course_id: Option<serde_json::Value>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    status: Option<TransactionStatus>,
    #[serde(default)]
    block_number: Option<u64>,
    #[serde(default, rename = "certificateCID")]
    certificate_cid: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Serialize)]
pub struct NewTransactionResponse {
    success: bool,
    transaction: TransactionRecord,
}

/// Append a transaction, filling in defaults for omitted fields.
pub async fn add_transaction(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewTransactionRequest>,
) -> Result<(StatusCode, Json<NewTransactionResponse>), ApiError> {
    let user = parse_address("userAddress", &req.user_address)?;

    let course_id = match req.course_id {
        None | Some(serde_json::Value::Null) => "0".to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(serde_json::Value::String(_)) => "0".to_string(),
        Some(_) => return Err(invalid_field("courseId", "courseId must be a string or number")),
    };

    let tx = TransactionRecord {
        hash: req
            .hash
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(synthetic_hash),
        kind: req.kind,
        amount: req
            .amount
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| "0".to_string()),
        course_id,
        timestamp: req.timestamp.unwrap_or_else(now),
        status: req.status.unwrap_or_default(),
        block_number: req.block_number,
        certificate_cid: req.certificate_cid,
        reason: req.reason,
    };

    let inserted = state
        .storage
        .insert_transaction(&user, &tx, TransactionSource::Api)
        .await
        .map_err(internal_error)?;
    let status = if inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(NewTransactionResponse {
            success: true,
            transaction: tx,
        }),
    ))
}
