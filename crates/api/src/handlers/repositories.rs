//! Repository submissions and commit review.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use poc_core::{normalize_address, CommitStatus, RepositoryStatus, RewardType};
use poc_indexer::{
    storage::{Commit, CommitReview, NewRepository, Repository, RepositoryStats},
    verification::parse_repository,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{parse_address, require_address, require_text};
use crate::error::{
    internal_error, invalid_field, not_found, storage_error, ApiError, ApiJson, ApiQuery,
    ApiResult,
};
use crate::payouts::try_award_datacoins;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoriesQuery {
    user_address: Option<String>,
    #[serde(default)]
    admin: bool,
}

#[derive(Serialize)]
pub struct RepositoriesResponse {
    repositories: Vec<Repository>,
}

/// Repositories of `userAddress`, or all of them with `admin=true`.
pub async fn list_repositories(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RepositoriesQuery>,
) -> ApiResult<RepositoriesResponse> {
    let owner = if query.admin {
        None
    } else {
        Some(require_address("userAddress", query.user_address.as_deref())?)
    };

    let repositories = state
        .storage
        .list_repositories(owner.as_ref())
        .await
        .map_err(internal_error)?;
    Ok(Json(RepositoriesResponse { repositories }))
}

pub async fn get_repository(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Repository> {
    state
        .storage
        .get_repository(&id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Repository not found"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    stars: u64,
    #[serde(default)]
    forks: u64,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    github_username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRepositoryRequest {
    user_address: String,
    repo_url: String,
    #[serde(default)]
    repo_data: RepoData,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRepositoryResponse {
    success: bool,
    repository: Repository,
    data_coins_awarded: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reward_transaction_hash: Option<String>,
}

/// Submit a repository for review.
///
/// Commits are fetched from GitHub when a client is configured; a fetch
/// failure leaves the repository without commits. The submission reward is
/// best effort.
pub async fn submit_repository(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SubmitRepositoryRequest>,
) -> Result<(StatusCode, Json<SubmitRepositoryResponse>), ApiError> {
    let user_address = parse_address("userAddress", &req.user_address)?;
    let repo_url = require_text("repoUrl", &req.repo_url)?.to_string();

    let user = state
        .storage
        .get_user(&user_address)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("User not found, register before submitting repositories"))?;

    let parsed = parse_repository(&repo_url);
    let data = req.repo_data;
    let repo_owner = data
        .owner
        .or_else(|| parsed.as_ref().map(|(owner, _)| owner.clone()))
        .ok_or_else(|| invalid_field("repoUrl", "Cannot determine repository owner"))?;
    let repo_name = data
        .name
        .or_else(|| parsed.as_ref().map(|(_, name)| name.clone()))
        .ok_or_else(|| invalid_field("repoUrl", "Cannot determine repository name"))?;

    let commits = match &state.github {
        Some(github) => match github.list_commits(&repo_owner, &repo_name).await {
            Ok(commits) => commits,
            Err(e) => {
                warn!(owner = %repo_owner, repo = %repo_name, "GitHub commit fetch failed: {:#}", e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let details = NewRepository {
        user_address,
        user_name: user.name,
        user_email: user.email,
        github_username: data.github_username.unwrap_or_else(|| repo_owner.clone()),
        repo_url,
        repo_name,
        repo_owner,
        description: data.description,
        language: data.language,
        stars: data.stars,
        forks: data.forks,
        is_private: data.is_private,
    };

    let repository = state
        .storage
        .insert_repository(&details, &commits)
        .await
        .map_err(internal_error)?;
    info!(
        id = %repository.id,
        owner = %user_address,
        commits = repository.total_commits,
        "Repository submitted"
    );

    let reward = RewardType::RepositorySubmission;
    let awarded = try_award_datacoins(
        &state,
        user_address,
        reward.amount(),
        &format!("Repository submission: {}", repository.details.repo_name),
        reward.as_str(),
        None,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(SubmitRepositoryResponse {
            success: true,
            data_coins_awarded: if awarded.is_some() { reward.amount() } else { 0 },
            reward_transaction_hash: awarded.map(|(receipt, _)| receipt.tx_hash),
            repository,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RepositoryAction {
    #[serde(rename_all = "camelCase")]
    UpdateStatus {
        status: RepositoryStatus,
        reviewed_by: String,
    },
    #[serde(rename_all = "camelCase")]
    AddCommits { commits: Vec<Commit> },
    #[serde(rename_all = "camelCase")]
    VerifyCommit {
        commit_sha: String,
        status: CommitStatus,
        verified_by: String,
        #[serde(default)]
        data_coins_earned: Option<u64>,
        #[serde(default)]
        notes: Option<String>,
    },
}

/// Admin actions on a repository.
///
/// Approving a repository and verifying a commit pay the reviewer when the
/// reviewer is identified by a wallet address.
pub async fn update_repository(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(action): ApiJson<RepositoryAction>,
) -> ApiResult<Repository> {
    match action {
        RepositoryAction::UpdateStatus {
            status,
            reviewed_by,
        } => {
            let reviewed_by = require_text("reviewedBy", &reviewed_by)?.to_string();
            let repository = state
                .storage
                .update_repository_status(&id, status, &reviewed_by)
                .await
                .map_err(storage_error)?;
            info!(id = %id, status = %status.as_str(), reviewed_by = %reviewed_by, "Repository reviewed");

            if status == RepositoryStatus::Approved {
                pay_reviewer(
                    &state,
                    &reviewed_by,
                    RewardType::RepositoryApproval,
                    &format!("Repository approval: {}", repository.details.repo_name),
                )
                .await;
            }
            Ok(Json(repository))
        }
        RepositoryAction::AddCommits { commits } => {
            let repository = state
                .storage
                .add_commits(&id, &commits)
                .await
                .map_err(storage_error)?;
            Ok(Json(repository))
        }
        RepositoryAction::VerifyCommit {
            commit_sha,
            status,
            verified_by,
            data_coins_earned,
            notes,
        } => {
            let commit_sha = require_text("commitSha", &commit_sha)?.to_string();
            let verified_by = require_text("verifiedBy", &verified_by)?.to_string();
            let default_coins = if status == CommitStatus::Verified {
                RewardType::CommitVerification.amount()
            } else {
                0
            };

            let review = CommitReview {
                status,
                verified_by: verified_by.clone(),
                data_coins_earned: data_coins_earned.unwrap_or(default_coins),
                notes,
            };
            let repository = state
                .storage
                .verify_commit(&id, &commit_sha, &review)
                .await
                .map_err(storage_error)?;

            if status == CommitStatus::Verified {
                pay_reviewer(
                    &state,
                    &verified_by,
                    RewardType::CommitVerification,
                    &format!("Commit verification: {}", commit_sha),
                )
                .await;
            }
            Ok(Json(repository))
        }
    }
}

async fn pay_reviewer(state: &AppState, reviewer: &str, reward: RewardType, reason: &str) {
    let Ok(address) = normalize_address(reviewer) else {
        return;
    };
    try_award_datacoins(state, address, reward.amount(), reason, reward.as_str(), None).await;
}

pub async fn repository_stats(State(state): State<AppState>) -> ApiResult<RepositoryStats> {
    let stats = state
        .storage
        .repository_stats()
        .await
        .map_err(internal_error)?;
    Ok(Json(stats))
}
