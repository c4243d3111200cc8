//! Contribution permits for SBT minting.

use axum::{extract::State, Json};
use poc_core::{
    address_key,
    permit::{commit_hash, permit_domain, PermitData, SignedPermit},
    Address, MANUAL_PERMIT_REPUTATION, PENDING_TOKEN_URI, PERMIT_TTL_SECS,
};
use poc_indexer::verification::{build_contribution_metadata, VerifyCommitRequest};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{now, parse_address, require_text};
use crate::error::{
    bad_request, internal_error, service_unavailable, upstream_error, ApiJson, ApiResult,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    repo: String,
    #[serde(alias = "commitSha")]
    sha: String,
    #[serde(alias = "userAddress")]
    wallet: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    diff: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitResponse {
    success: bool,
    permit: SignedPermit,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata_cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signer: Option<Address>,
    verification: &'static str,
}

/// Pin contribution metadata. Falls back to the pending URI when pinning
/// fails so the permit can still be issued.
async fn pin_metadata(state: &AppState, repo: &str, sha: &str, manual: bool) -> (String, Option<String>) {
    let metadata = build_contribution_metadata(repo, sha, manual);
    match state.pinner.pin_json(&metadata).await {
        Ok(cid) => (format!("ipfs://{}", cid), Some(cid)),
        Err(e) => {
            warn!(repo, sha, "Metadata pinning failed, using pending URI: {:#}", e);
            (PENDING_TOKEN_URI.to_string(), None)
        }
    }
}

/// Ask the AI verifier to score the commit and sign a permit.
pub async fn verify_contribution(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> ApiResult<PermitResponse> {
    let wallet = parse_address("wallet", &req.wallet)?;
    let repo = require_text("repo", &req.repo)?.to_string();
    let sha = require_text("sha", &req.sha)?.to_string();

    let Some(verifier) = state.ai_verifier.clone() else {
        return Err(service_unavailable(
            "AI verification service is not configured, use manual verification",
        ));
    };

    let (token_uri, metadata_cid) = pin_metadata(&state, &repo, &sha, false).await;
    let request = VerifyCommitRequest {
        repo: repo.clone(),
        sha: sha.clone(),
        message: req.message,
        diff: req.diff,
        wallet,
        expiry: now() as u64 + PERMIT_TTL_SECS,
        chain_id: state.chain_id,
        verifying_contract: state.verifying_contract,
        token_uri: Some(token_uri),
    };

    let permit = verifier
        .verify_commit(&request)
        .await
        .map_err(upstream_error)?;
    info!(
        wallet = %wallet,
        repo = %repo,
        sha = %sha,
        reputation = permit.permit.reputation,
        "AI verified contribution"
    );

    Ok(Json(PermitResponse {
        success: true,
        permit,
        metadata_cid,
        signer: None,
        verification: "ai",
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualVerifyRequest {
    repo: String,
    #[serde(alias = "commitSha")]
    sha: String,
    #[serde(alias = "userAddress")]
    wallet: String,
}

/// Issue a manual-review permit signed with the local verifier key.
///
/// Without a key the permit carries an all-zero signature, which the
/// contract rejects; the response is still useful for previews.
pub async fn manual_verify(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ManualVerifyRequest>,
) -> ApiResult<PermitResponse> {
    let wallet = parse_address("wallet", &req.wallet)?;
    let repo = require_text("repo", &req.repo)?.to_string();
    let sha = require_text("sha", &req.sha)?.to_string();

    let (token_uri, metadata_cid) = pin_metadata(&state, &repo, &sha, true).await;
    let now = now() as u64;

    let (permit, signer) = match &state.permit_signer {
        Some(signer) => (
            signer
                .sign_manual(wallet, &repo, &sha, token_uri, now)
                .map_err(internal_error)?,
            Some(signer.address()),
        ),
        None => {
            warn!("PERMIT_SIGNER_KEY not set, returning an unsigned manual permit");
            (
                SignedPermit {
                    permit: PermitData {
                        to: wallet,
                        commit_hash: commit_hash(&repo, &sha, &address_key(&wallet)),
                        reputation: MANUAL_PERMIT_REPUTATION,
                        expiry: now + PERMIT_TTL_SECS,
                        token_uri,
                    },
                    signature: format!("0x{}", "0".repeat(130)),
                },
                None,
            )
        }
    };

    Ok(Json(PermitResponse {
        success: true,
        permit,
        metadata_cid,
        signer,
        verification: "manual",
    }))
}

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    permit: PermitData,
    signature: String,
}

#[derive(Serialize)]
pub struct MintArgsResponse {
    ok: bool,
    /// Arguments of the contract's `mintWithPermit`.
    args: (PermitData, String),
}

/// Check a signed permit before the wallet submits it on-chain.
///
/// Rejects expired permits and signatures that do not recover to the
/// configured permit verifier.
pub async fn mint_args(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<MintRequest>,
) -> ApiResult<MintArgsResponse> {
    let Some(verifier) = state.permit_verifier else {
        return Err(service_unavailable(
            "Permit verifier is not configured, set PERMIT_VERIFIER_ADDRESS",
        ));
    };

    if req.permit.is_expired(now() as u64) {
        return Err(bad_request("Permit expired"));
    }

    let signed = SignedPermit {
        permit: req.permit,
        signature: req.signature,
    };
    let domain = permit_domain(state.chain_id, state.verifying_contract);
    match signed.recover_signer(&domain) {
        Ok(signer) if signer == verifier => {}
        Ok(signer) => {
            warn!(%signer, %verifier, "Permit signed by an unexpected key");
            return Err(bad_request("Invalid signature"));
        }
        Err(_) => return Err(bad_request("Invalid signature")),
    }

    Ok(Json(MintArgsResponse {
        ok: true,
        args: (signed.permit, signed.signature),
    }))
}
