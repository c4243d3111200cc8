//! Witness-verified consumer data contributions.

use axum::{extract::State, Json};
use poc_core::consumer::{ClaimProof, ConsumerData, DataSource};
use poc_indexer::storage::{ConsumerContribution, SourceTotals};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{parse_address, require_address};
use crate::error::{
    bad_request, internal_error, invalid_field, service_unavailable, storage_error, ApiJson,
    ApiQuery, ApiResult,
};
use crate::payouts::{mint_datacoins, record_award};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitConsumerDataRequest {
    user_address: String,
    source: String,
    proof: ClaimProof,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitConsumerDataResponse {
    success: bool,
    contribution: ConsumerContribution,
    transaction_hash: String,
    simulated: bool,
}

/// Verify a witness proof, store the extracted figures and pay for them.
///
/// Each proof pays once. The stored contribution is removed again if the
/// mint fails so the proof can be resubmitted.
pub async fn submit_consumer_data(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SubmitConsumerDataRequest>,
) -> ApiResult<SubmitConsumerDataResponse> {
    let user = parse_address("userAddress", &req.user_address)?;
    let source: DataSource = req
        .source
        .parse()
        .map_err(|e: poc_core::CoreError| invalid_field("source", e.to_string()))?;

    let Some(verifier) = state.proof_verifier.clone() else {
        return Err(service_unavailable(
            "Consumer data verification is not configured",
        ));
    };
    verifier
        .verify(&req.proof)
        .await
        .map_err(|e| bad_request(format!("{:#}", e)))?;

    let data = ConsumerData::extract(source, &req.proof.claim_data.extracted_parameters());
    let data_coins = data.data_coins();
    if data_coins == 0 {
        return Err(bad_request("Proof contains no rewardable data"));
    }

    let proof_id = req.proof.claim_data.identifier.to_lowercase();
    let contribution = state
        .storage
        .insert_consumer_data(&user, source, &proof_id, &data, data_coins)
        .await
        .map_err(storage_error)?;

    let reason = format!("{} data contribution", source);
    let receipt = match mint_datacoins(&state, user, contribution.data_coins, &reason).await {
        Ok(receipt) => receipt,
        Err(e) => {
            if let Err(delete_err) = state.storage.delete_consumer_data(&contribution.id).await {
                warn!(
                    user = %user,
                    proof_id = %proof_id,
                    "Failed to drop unpaid consumer data: {:#}",
                    delete_err
                );
            }
            return Err(internal_error(e));
        }
    };
    record_award(
        &state,
        user,
        contribution.data_coins,
        &receipt,
        source.reward_type().as_str(),
        None,
    )
    .await;

    info!(
        user = %user,
        source = %source,
        data_coins = contribution.data_coins,
        first = contribution.first_contribution,
        "Consumer data accepted"
    );

    Ok(Json(SubmitConsumerDataResponse {
        success: true,
        contribution,
        transaction_hash: receipt.tx_hash,
        simulated: receipt.simulated,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDataQuery {
    user_address: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDataStats {
    total_contributions: u64,
    total_data_coins: u64,
    by_source: BTreeMap<DataSource, SourceTotals>,
    last_contribution: Option<i64>,
    contributions: Vec<ConsumerContribution>,
}

/// A user's contributions with totals per source.
pub async fn consumer_data_stats(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ConsumerDataQuery>,
) -> ApiResult<ConsumerDataStats> {
    let user = require_address("userAddress", query.user_address.as_deref())?;
    let by_source = state
        .storage
        .consumer_data_totals(&user)
        .await
        .map_err(internal_error)?;
    let contributions = state
        .storage
        .list_consumer_data(&user)
        .await
        .map_err(internal_error)?;

    Ok(Json(ConsumerDataStats {
        total_contributions: by_source.values().map(|t| t.contributions).sum(),
        total_data_coins: by_source.values().map(|t| t.data_coins).sum(),
        last_contribution: contributions.first().map(|c| c.created_at),
        by_source,
        contributions,
    }))
}
