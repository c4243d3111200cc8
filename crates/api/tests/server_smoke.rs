use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use poc_api::{build_app, build_state, router_for_state, ApiRuntimeConfig};
use poc_core::{
    permit::{permit_domain, SignedPermit},
    Address, TransactionKind, TransactionRecord, TransactionStatus,
};
use alloy::primitives::U256;
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use poc_core::consumer::{claim_identifier, ClaimData};
use poc_indexer::{
    attestation::WitnessVerifier,
    listener::HistorySource,
    minter::{MintReceipt, RewardMinter},
    pinning::CertificatePinner,
    reputation::{ReputationScore, ReputationSource},
};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tempfile::TempDir;
use tower::ServiceExt;

const LEARNER: &str = "0x1111111111111111111111111111111111111111";
const REVIEWER: &str = "0x2222222222222222222222222222222222222222";

/// Address of the fixed permit signer used by `ApiRuntimeConfig::for_test`.
const TEST_SIGNER: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

async fn test_app() -> (Router, TempDir) {
    let temp = TempDir::new().expect("tempdir");
    let db_url = format!("sqlite://{}", temp.path().join("poc-smoke.db").display());
    let app = build_app(&ApiRuntimeConfig::for_test(db_url))
        .await
        .expect("build in-process app");
    (app, temp)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serialize body"))),
        None => request.body(Body::empty()),
    }
    .expect("build request");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should be served");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("decode response body")
    };
    (status, json)
}

async fn register(app: &Router, address: &str, email: &str) -> StatusCode {
    let (status, _) = send(
        app,
        "POST",
        "/v1/users",
        Some(json!({ "address": address, "name": "Ada", "email": email })),
    )
    .await;
    status
}

async fn put_course(app: &Router, id: u64, modules: usize) {
    let modules: Vec<Value> = (1..=modules)
        .map(|i| json!({ "id": i, "title": format!("Module {}", i), "lessons": 3, "duration": "1h" }))
        .collect();
    let (status, body) = send(
        app,
        "PUT",
        &format!("/v1/courses/{}", id),
        Some(json!({
            "id": id,
            "title": "Solidity 101",
            "difficulty": "Beginner",
            "stakeAmount": "0.01",
            "modules": modules,
            "assignments": [{ "id": "deploy", "heading": "Deploy a contract" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "course upsert failed: {}", body);
}

#[tokio::test]
async fn health_reports_database() {
    let (app, _temp) = test_app().await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let (app, _temp) = test_app().await;

    assert_eq!(register(&app, LEARNER, "ada@example.com").await, StatusCode::CREATED);
    assert_eq!(register(&app, REVIEWER, "ADA@example.com").await, StatusCode::CONFLICT);
    assert_eq!(register(&app, REVIEWER, "not-an-email").await, StatusCode::BAD_REQUEST);

    let (status, user) = send(&app, "GET", &format!("/v1/users/{}", LEARNER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["name"], "Ada");

    let (status, body) = send(&app, "GET", &format!("/v1/users/{}", REVIEWER), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn course_catalogue_validates_and_deletes() {
    let (app, _temp) = test_app().await;
    put_course(&app, 1, 3).await;

    let (status, courses) = send(&app, "GET", "/v1/courses", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(courses["courses"].as_array().map(Vec::len), Some(1));

    let (status, body) = send(
        &app,
        "PUT",
        "/v1/courses/2",
        Some(json!({
            "id": 2,
            "title": "Empty",
            "difficulty": "Advanced",
            "stakeAmount": "0.01",
            "modules": []
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "modules");

    let (status, _) = send(&app, "DELETE", "/v1/courses/1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", "/v1/courses/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stake_complete_and_refund_flow() {
    let (app, _temp) = test_app().await;
    put_course(&app, 1, 2).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/stakes",
        Some(json!({ "userAddress": LEARNER, "courseId": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "stake failed: {}", body);
    assert_eq!(body["progress"]["completedModules"], 0);
    assert_eq!(body["transaction"]["type"], "stake");
    assert_eq!(body["transaction"]["amount"], "0.01");

    let (status, _) = send(
        &app,
        "POST",
        "/v1/stakes",
        Some(json!({ "userAddress": LEARNER, "courseId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let complete = |module: u32| {
        json!({ "userAddress": LEARNER, "courseId": 1, "moduleId": module })
    };

    let (status, body) = send(
        &app,
        "POST",
        "/v1/learning-progress/modules/complete",
        Some(complete(2)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, body) = send(
        &app,
        "POST",
        "/v1/learning-progress/modules/complete",
        Some(complete(1)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progressPercentage"], 50);
    assert_eq!(body["currentModuleId"], 2);

    let (status, _) = send(
        &app,
        "POST",
        "/v1/learning-progress/refund",
        Some(json!({ "userAddress": LEARNER, "courseId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/learning-progress/modules/complete",
        Some(complete(2)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progressPercentage"], 100);
    assert_eq!(body["completedModules"], 2);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/complete-course",
        Some(json!({ "userAddress": LEARNER, "courseId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "complete-course failed: {}", body);
    let cid = body["cid"].as_str().expect("cid").to_string();
    assert_eq!(body["dataCoinsAllocated"], 6);
    assert_eq!(body["certificateData"]["courseName"], "Solidity 101");
    assert_eq!(body["transaction"]["certificateCID"], cid.as_str());
    assert!(body["gatewayUrl"].as_str().unwrap().ends_with(&cid));

    let (status, _) = send(
        &app,
        "POST",
        "/v1/complete-course",
        Some(json!({ "userAddress": LEARNER, "courseId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let certificate_uri = format!("/v1/certificates/{}", cid);
    let (status, certificate) = send(
        &app,
        "GET",
        &format!("{}?userAddress={}", certificate_uri, LEARNER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(certificate["courseId"], 1);

    let (status, _) = send(&app, "GET", &certificate_uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        "GET",
        &format!("{}?userAddress={}", certificate_uri, REVIEWER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let course_reward = json!({ "userAddress": LEARNER, "courseId": 1, "difficulty": "Beginner" });
    let (status, body) = send(&app, "POST", "/v1/rewards/course", Some(course_reward.clone())).await;
    assert_eq!(status, StatusCode::OK, "course reward failed: {}", body);
    assert_eq!(body["amount"], 10);
    let (status, _) = send(&app, "POST", "/v1/rewards/course", Some(course_reward)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/learning-progress/refund",
        Some(json!({ "userAddress": LEARNER, "courseId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["isStakeReturned"], true);
    assert_eq!(body["transaction"]["amount"], "0.01");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/transactions?userAddress={}", LEARNER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let txs = body["transactions"].as_array().expect("transactions");
    let kinds: Vec<&str> = txs.iter().filter_map(|t| t["type"].as_str()).collect();
    for kind in ["stake", "complete", "datacoin", "refund"] {
        assert!(kinds.contains(&kind), "missing {} in {:?}", kind, kinds);
    }
    let timestamps: Vec<i64> = txs.iter().filter_map(|t| t["timestamp"].as_i64()).collect();
    assert!(timestamps.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn assignments_follow_course_definition() {
    let (app, _temp) = test_app().await;
    put_course(&app, 4, 1).await;
    send(
        &app,
        "POST",
        "/v1/stakes",
        Some(json!({ "userAddress": LEARNER, "courseId": 4 })),
    )
    .await;

    let submit = |id: &str| {
        json!({
            "userAddress": LEARNER,
            "courseId": 4,
            "assignmentId": id,
            "submissionUrl": "https://github.com/ada/deploy"
        })
    };
    let (status, _) = send(
        &app,
        "POST",
        "/v1/learning-progress/assignments/submit",
        Some(submit("unknown")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let verify = json!({
        "userAddress": LEARNER,
        "courseId": 4,
        "assignmentId": "deploy",
        "verifiedBy": "mentor"
    });
    let (status, _) = send(
        &app,
        "POST",
        "/v1/learning-progress/assignments/verify",
        Some(verify.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        "/v1/learning-progress/assignments/submit",
        Some(submit("deploy")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/learning-progress/assignments/verify",
        Some(verify),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verifiedAssignments"], 1);
    assert_eq!(body["assignments"][0]["verifiedBy"], "mentor");
}

#[tokio::test]
async fn progress_rewards_pay_once_per_module() {
    let (app, _temp) = test_app().await;
    let course_uri = format!("/v1/progress?userAddress={}&courseId=9", LEARNER);

    let (status, body) = send(&app, "GET", &course_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["totalModules"], 4);
    assert_eq!(body["progress"]["completedModules"], 0);

    let claim = |module: u32| {
        json!({
            "userAddress": LEARNER,
            "rewardType": "course_progress",
            "courseId": "9",
            "moduleId": module
        })
    };

    let (status, body) = send(&app, "POST", "/v1/progress", Some(claim(1))).await;
    assert_eq!(status, StatusCode::OK, "claim failed: {}", body);
    assert_eq!(body["reward"]["amount"], 3);
    assert_eq!(body["reward"]["progressPercentage"], 25);
    assert_eq!(body["reward"]["simulated"], true);

    let (status, _) = send(&app, "POST", "/v1/progress", Some(claim(1))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "POST", "/v1/progress", Some(claim(3))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/progress",
        Some(json!({ "userAddress": LEARNER, "rewardType": "lottery" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "rewardType");

    let (status, body) = send(&app, "GET", &course_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let modules = body["progress"]["modules"].as_array().expect("modules");
    assert_eq!(modules.len(), 4);
    assert_eq!(modules[0]["completed"], true);
    assert_eq!(modules[0]["rewardEarned"], 3);
    assert!(modules[0]["transactionHash"].is_string());
    assert_eq!(modules[1]["completed"], false);
    assert!(modules[1]["rewardEarned"].is_null());

    let (status, summary) = send(
        &app,
        "GET",
        &format!("/v1/progress?userAddress={}", LEARNER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["totalProgressRewards"], 3.0);
    assert_eq!(summary["milestones"][0]["reason"], "course_progress");
}

#[tokio::test]
async fn posted_transactions_get_defaults_and_feed_stats() {
    let (app, _temp) = test_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/transactions",
        Some(json!({ "userAddress": LEARNER, "type": "mint", "timestamp": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let tx = &body["transaction"];
    assert_eq!(tx["amount"], "0");
    assert_eq!(tx["courseId"], "0");
    assert_eq!(tx["status"], "success");
    assert_eq!(tx["hash"].as_str().map(str::len), Some(66));

    send(
        &app,
        "POST",
        "/v1/transactions",
        Some(json!({
            "userAddress": LEARNER,
            "type": "stake",
            "amount": "0.01",
            "courseId": 3,
            "timestamp": 200
        })),
    )
    .await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/transactions?userAddress={}", LEARNER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transactions"][0]["type"], "stake");
    assert_eq!(body["transactions"][0]["courseId"], "3");
    assert_eq!(body["transactions"][1]["type"], "mint");

    let (status, stats) = send(&app, "GET", &format!("/v1/stats/users/{}", LEARNER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["transactionCount"], 2);
    assert_eq!(stats["sbts"]["total"], 1);
    assert_eq!(stats["reputation"]["total"], 30);

    let (status, board) = send(&app, "GET", "/v1/leaderboard?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["leaderboard"][0]["rank"], 1);
    assert_eq!(board["leaderboard"][0]["reputation"], 30);

    let (status, _) = send(&app, "GET", "/v1/transactions", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn repository_review_flow() {
    let (app, _temp) = test_app().await;

    let submission = json!({
        "userAddress": LEARNER,
        "repoUrl": "https://github.com/ada/engine",
        "repoData": { "language": "Rust", "stars": 4 }
    });
    let (status, _) = send(&app, "POST", "/v1/repositories", Some(submission.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    register(&app, LEARNER, "ada@example.com").await;
    let (status, body) = send(&app, "POST", "/v1/repositories", Some(submission)).await;
    assert_eq!(status, StatusCode::CREATED, "submit failed: {}", body);
    assert_eq!(body["dataCoinsAwarded"], 10);
    assert_eq!(body["repository"]["repoOwner"], "ada");
    assert_eq!(body["repository"]["repoName"], "engine");
    assert_eq!(body["repository"]["status"], "pending");
    let id = body["repository"]["id"].as_str().expect("id").to_string();
    let repo_uri = format!("/v1/repositories/{}", id);

    let (status, body) = send(
        &app,
        "PUT",
        &repo_uri,
        Some(json!({
            "action": "addCommits",
            "commits": [
                { "sha": "abc1234", "message": "fix overflow", "author": "ada", "date": "2024-05-01T00:00:00Z" },
                { "sha": "def5678", "message": "docs", "author": "ada", "date": "2024-05-02T00:00:00Z" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalCommits"], 2);

    let (status, body) = send(
        &app,
        "PUT",
        &repo_uri,
        Some(json!({
            "action": "verifyCommit",
            "commitSha": "abc1234",
            "status": "verified",
            "verifiedBy": REVIEWER
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verifiedCommits"], 1);
    assert_eq!(body["dataCoinsEarned"], 5);

    let (status, _) = send(
        &app,
        "PUT",
        &repo_uri,
        Some(json!({
            "action": "verifyCommit",
            "commitSha": "missing",
            "status": "verified",
            "verifiedBy": REVIEWER
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "PUT",
        &repo_uri,
        Some(json!({ "action": "updateStatus", "status": "approved", "reviewedBy": REVIEWER })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    let (status, rewards) = send(
        &app,
        "GET",
        &format!("/v1/rewards?userAddress={}", REVIEWER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rewards["totalEarned"], 55.0);

    let (status, stats) = send(&app, "GET", "/v1/stats/repositories", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["approvedRepositories"], 1);
    assert_eq!(stats["verifiedCommits"], 1);

    let (status, _) = send(&app, "GET", "/v1/repositories", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, all) = send(&app, "GET", "/v1/repositories?admin=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["repositories"].as_array().map(Vec::len), Some(1));
}

async fn datacoin_count(app: &Router, address: &str) -> usize {
    let (status, body) = send(app, "GET", &format!("/v1/rewards?userAddress={}", address), None).await;
    assert_eq!(status, StatusCode::OK);
    body["rewards"].as_array().map(Vec::len).unwrap_or_default()
}

#[tokio::test]
async fn course_reward_requires_completed_enrollment() {
    let (app, _temp) = test_app().await;
    put_course(&app, 2, 1).await;
    let reward = json!({ "userAddress": LEARNER, "courseId": 2, "difficulty": "Intermediate" });

    let (status, _) = send(&app, "POST", "/v1/rewards/course", Some(reward.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app,
        "POST",
        "/v1/complete-course",
        Some(json!({ "userAddress": LEARNER, "courseId": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(datacoin_count(&app, LEARNER).await, 0);

    send(
        &app,
        "POST",
        "/v1/stakes",
        Some(json!({ "userAddress": LEARNER, "courseId": 2 })),
    )
    .await;
    let (status, _) = send(&app, "POST", "/v1/rewards/course", Some(reward.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    send(
        &app,
        "POST",
        "/v1/learning-progress/modules/complete",
        Some(json!({ "userAddress": LEARNER, "courseId": 2, "moduleId": 1 })),
    )
    .await;
    let (status, _) = send(
        &app,
        "POST",
        "/v1/complete-course",
        Some(json!({ "userAddress": LEARNER, "courseId": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/v1/rewards/course", Some(reward.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], 25);
    let (status, _) = send(&app, "POST", "/v1/rewards/course", Some(reward)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    // Certificate allocation plus one difficulty reward.
    assert_eq!(datacoin_count(&app, LEARNER).await, 2);

    let (status, _) = send(
        &app,
        "POST",
        "/v1/rewards/course",
        Some(json!({ "userAddress": LEARNER, "courseId": 2, "difficulty": "Expert" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reading_reward_progress_does_not_block_staking() {
    let (app, _temp) = test_app().await;
    put_course(&app, 1, 2).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/progress?userAddress={}&courseId=1", LEARNER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["totalModules"], 2);

    let (status, _) = send(
        &app,
        "POST",
        "/v1/learning-progress/refund",
        Some(json!({ "userAddress": LEARNER, "courseId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/stakes",
        Some(json!({ "userAddress": LEARNER, "courseId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "stake failed: {}", body);
    assert_eq!(body["progress"]["isStaked"], true);
    assert_eq!(body["progress"]["stakeAmount"], "0.01");
    assert_eq!(body["transaction"]["type"], "stake");

    let (status, _) = send(
        &app,
        "POST",
        "/v1/stakes",
        Some(json!({ "userAddress": LEARNER, "courseId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

/// Fails the first `failures` mints, then succeeds.
struct FlakyMinter {
    failures: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl RewardMinter for FlakyMinter {
    async fn mint(&self, _to: Address, _amount: U256, _reason: &str) -> anyhow::Result<MintReceipt> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("execution reverted");
        }
        Ok(MintReceipt {
            tx_hash: format!("0x{:064x}", call + 1),
            token_address: Address::ZERO,
            simulated: false,
        })
    }
}

#[tokio::test]
async fn failed_mint_leaves_module_reward_claimable() {
    let temp = TempDir::new().expect("tempdir");
    let db_url = format!("sqlite://{}", temp.path().join("poc-mint.db").display());
    let minter = Arc::new(FlakyMinter {
        failures: AtomicUsize::new(1),
        calls: AtomicUsize::new(0),
    });
    let state = build_state(&ApiRuntimeConfig::for_test(db_url))
        .await
        .expect("build state")
        .with_minter(minter.clone());
    let app = router_for_state(state);

    let claim = json!({
        "userAddress": LEARNER,
        "rewardType": "course_progress",
        "courseId": 5,
        "moduleId": 1
    });
    let (status, _) = send(&app, "POST", "/v1/progress", Some(claim.clone())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(datacoin_count(&app, LEARNER).await, 0);

    let (status, body) = send(&app, "POST", "/v1/progress", Some(claim.clone())).await;
    assert_eq!(status, StatusCode::OK, "retry failed: {}", body);
    assert_eq!(body["reward"]["simulated"], false);

    let (status, _) = send(&app, "POST", "/v1/progress", Some(claim)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(minter.calls.load(Ordering::SeqCst), 2);
    assert_eq!(datacoin_count(&app, LEARNER).await, 1);

    let (_, body) = send(
        &app,
        "GET",
        &format!("/v1/progress?userAddress={}&courseId=5", LEARNER),
        None,
    )
    .await;
    assert_eq!(
        body["progress"]["modules"][0]["transactionHash"],
        format!("0x{:064x}", 2)
    );
}

#[derive(Default)]
struct RecordingPinner {
    pinned: Mutex<Vec<Value>>,
}

#[async_trait]
impl CertificatePinner for RecordingPinner {
    async fn pin_json(&self, value: &Value) -> anyhow::Result<String> {
        let mut pinned = self.pinned.lock().unwrap();
        pinned.push(value.clone());
        Ok(format!("bafkreipinned{}", pinned.len()))
    }
}

#[tokio::test]
async fn pinned_certificate_is_sealed_for_owner() {
    let temp = TempDir::new().expect("tempdir");
    let db_url = format!("sqlite://{}", temp.path().join("poc-pin.db").display());
    let pinner = Arc::new(RecordingPinner::default());
    let state = build_state(&ApiRuntimeConfig::for_test(db_url))
        .await
        .expect("build state")
        .with_pinner(pinner.clone());
    let app = router_for_state(state);

    put_course(&app, 3, 1).await;
    send(
        &app,
        "POST",
        "/v1/stakes",
        Some(json!({ "userAddress": LEARNER, "courseId": 3 })),
    )
    .await;
    send(
        &app,
        "POST",
        "/v1/learning-progress/modules/complete",
        Some(json!({ "userAddress": LEARNER, "courseId": 3, "moduleId": 1 })),
    )
    .await;
    let (status, body) = send(
        &app,
        "POST",
        "/v1/complete-course",
        Some(json!({ "userAddress": LEARNER, "courseId": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "complete-course failed: {}", body);
    assert_eq!(body["cid"], "bafkreipinned1");
    assert_eq!(body["certificateData"]["courseName"], "Solidity 101");

    let pinned = pinner.pinned.lock().unwrap().clone();
    assert_eq!(pinned.len(), 1);
    assert_eq!(pinned[0]["encryption"], "chacha20-poly1305");
    assert_eq!(pinned[0]["owner"], LEARNER);
    assert!(!pinned[0].to_string().contains("Solidity 101"));
}

#[tokio::test]
async fn manual_permit_recovers_to_configured_signer() {
    let (app, _temp) = test_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/manual-verify",
        Some(json!({ "repo": "ada/engine", "sha": "abc1234", "wallet": LEARNER })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "manual-verify failed: {}", body);
    assert_eq!(body["verification"], "manual");
    assert_eq!(body["permit"]["reputation"], 10);
    assert!(body["permit"]["tokenURI"]
        .as_str()
        .unwrap()
        .starts_with("ipfs://"));

    let permit: SignedPermit =
        serde_json::from_value(body["permit"].clone()).expect("decode permit");
    let domain = permit_domain(11155111, Address::repeat_byte(0x42));
    let signer = permit.recover_signer(&domain).expect("recover signer");
    assert_eq!(format!("{:#x}", signer), TEST_SIGNER);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/verify",
        Some(json!({ "repo": "ada/engine", "sha": "abc1234", "wallet": LEARNER })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "service_unavailable");
}

#[tokio::test]
async fn mint_args_require_fresh_permit_from_verifier() {
    let (app, _temp) = test_app().await;

    let (_, body) = send(
        &app,
        "POST",
        "/v1/manual-verify",
        Some(json!({ "repo": "ada/engine", "sha": "abc1234", "wallet": LEARNER })),
    )
    .await;
    let signed: SignedPermit =
        serde_json::from_value(body["permit"].clone()).expect("decode permit");

    let (status, body) = send(
        &app,
        "POST",
        "/v1/mint",
        Some(json!({ "permit": signed.permit, "signature": signed.signature })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "mint args failed: {}", body);
    assert_eq!(body["ok"], true);
    assert_eq!(body["args"][0]["reputation"], 10);
    assert_eq!(body["args"][1], signed.signature.as_str());

    let mut inflated = signed.permit.clone();
    inflated.reputation = 1_000;
    let (status, body) = send(
        &app,
        "POST",
        "/v1/mint",
        Some(json!({ "permit": inflated, "signature": signed.signature })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Invalid signature");

    let mut stale = signed.permit.clone();
    stale.expiry = 1;
    let (status, body) = send(
        &app,
        "POST",
        "/v1/mint",
        Some(json!({ "permit": stale, "signature": signed.signature })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Permit expired");

    let (status, _) = send(
        &app,
        "POST",
        "/v1/mint",
        Some(json!({ "permit": signed.permit, "signature": "0x1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn witness_proof(witness: &PrivateKeySigner, extracted: Value) -> Value {
    let parameters = r#"{"url":"https://example.com/history"}"#;
    let context = json!({ "extractedParameters": extracted }).to_string();
    let claim = ClaimData {
        provider: "http".to_string(),
        parameters: parameters.to_string(),
        identifier: format!("{:#x}", claim_identifier("http", parameters, &context)),
        context,
        owner: format!("{:#x}", witness.address()),
        timestamp_s: 1_700_000_000,
        epoch: 1,
    };
    let signature = witness
        .sign_message_sync(claim.signed_message().as_bytes())
        .expect("sign claim");
    json!({
        "claimData": claim,
        "signatures": [format!("0x{}", hex_encode(&signature.as_bytes()))],
        "witnesses": []
    })
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[tokio::test]
async fn consumer_data_pays_once_per_proof() {
    let temp = TempDir::new().expect("tempdir");
    let db_url = format!("sqlite://{}", temp.path().join("poc-consumer.db").display());
    let witness = PrivateKeySigner::random();
    let minter = Arc::new(FlakyMinter {
        failures: AtomicUsize::new(1),
        calls: AtomicUsize::new(0),
    });
    let state = build_state(&ApiRuntimeConfig::for_test(db_url))
        .await
        .expect("build state")
        .with_minter(minter.clone())
        .with_proof_verifier(Arc::new(
            WitnessVerifier::new([witness.address()]).expect("witness set"),
        ));
    let app = router_for_state(state);

    let rides = json!({
        "userAddress": LEARNER,
        "source": "uber",
        "proof": witness_proof(&witness, json!({ "rides": "40" }))
    });
    let (status, _) = send(&app, "POST", "/v1/consumer-data", Some(rides.clone())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, body) = send(&app, "POST", "/v1/consumer-data", Some(rides.clone())).await;
    assert_eq!(status, StatusCode::OK, "consumer data failed: {}", body);
    assert_eq!(body["contribution"]["firstContribution"], true);
    assert_eq!(body["contribution"]["dataCoins"], 40);
    assert_eq!(body["contribution"]["data"]["rides"], 40);

    let (status, _) = send(&app, "POST", "/v1/consumer-data", Some(rides)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/consumer-data",
        Some(json!({
            "userAddress": LEARNER,
            "source": "github",
            "proof": witness_proof(&witness, json!({ "commits": 2, "issues": "1" }))
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "github data failed: {}", body);
    assert_eq!(body["contribution"]["firstContribution"], false);
    assert_eq!(body["contribution"]["dataCoins"], 30);

    let forged = json!({
        "userAddress": LEARNER,
        "source": "amazon",
        "proof": witness_proof(&PrivateKeySigner::random(), json!({ "orders": 50 }))
    });
    let (status, _) = send(&app, "POST", "/v1/consumer-data", Some(forged)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let empty = json!({
        "userAddress": LEARNER,
        "source": "amazon",
        "proof": witness_proof(&witness, json!({ "orders": 0 }))
    });
    let (status, _) = send(&app, "POST", "/v1/consumer-data", Some(empty)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/consumer-data?userAddress={}", LEARNER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalContributions"], 2);
    assert_eq!(body["totalDataCoins"], 70);
    assert_eq!(body["bySource"]["uber"]["dataCoins"], 40);
    assert_eq!(body["contributions"].as_array().unwrap().len(), 2);
    assert_eq!(datacoin_count(&app, LEARNER).await, 2);
    assert_eq!(minter.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn consumer_data_needs_witness_configuration() {
    let (app, _temp) = test_app().await;
    let witness = PrivateKeySigner::random();

    let (status, _) = send(
        &app,
        "POST",
        "/v1/consumer-data",
        Some(json!({
            "userAddress": LEARNER,
            "source": "uber",
            "proof": witness_proof(&witness, json!({ "rides": 12 }))
        })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(
        &app,
        "POST",
        "/v1/consumer-data",
        Some(json!({
            "userAddress": LEARNER,
            "source": "spotify",
            "proof": witness_proof(&witness, json!({}))
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

struct FixedReputation(Vec<ReputationScore>);

#[async_trait]
impl ReputationSource for FixedReputation {
    async fn top_contributors(&self, limit: u64) -> anyhow::Result<Vec<ReputationScore>> {
        Ok(self.0.iter().take(limit as usize).cloned().collect())
    }

    async fn score(&self, user: Address) -> anyhow::Result<U256> {
        Ok(self
            .0
            .iter()
            .find(|entry| entry.address == user)
            .map(|entry| entry.score)
            .unwrap_or_default())
    }
}

#[tokio::test]
async fn reputation_reads_contract_scores() {
    let (app, _temp) = test_app().await;
    let (status, _) = send(&app, "GET", "/v1/reputation", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let temp = TempDir::new().expect("tempdir");
    let db_url = format!("sqlite://{}", temp.path().join("poc-rep.db").display());
    let learner: Address = LEARNER.parse().expect("address");
    let reviewer: Address = REVIEWER.parse().expect("address");
    let state = build_state(&ApiRuntimeConfig::for_test(db_url))
        .await
        .expect("build state")
        .with_reputation_source(Arc::new(FixedReputation(vec![
            ReputationScore {
                address: learner,
                score: U256::from(1_500u64),
            },
            ReputationScore {
                address: reviewer,
                score: U256::from(20u64),
            },
        ])));
    let app = router_for_state(state);

    let (status, body) = send(&app, "GET", "/v1/reputation?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["addrs"], json!([LEARNER]));
    assert_eq!(body["scores"], json!(["1500"]));

    let (status, body) = send(&app, "GET", &format!("/v1/reputation/{}", REVIEWER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], "20");

    let (status, body) = send(
        &app,
        "GET",
        "/v1/reputation/0x3333333333333333333333333333333333333333",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], "0");
}

struct CountingHistory {
    calls: AtomicUsize,
    txs: Vec<TransactionRecord>,
}

#[async_trait]
impl HistorySource for CountingHistory {
    async fn user_history(
        &self,
        _user: Address,
        _lookback_blocks: u64,
    ) -> anyhow::Result<Vec<TransactionRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.txs.clone())
    }
}

async fn app_with_history(history: Arc<CountingHistory>) -> (Router, TempDir) {
    let temp = TempDir::new().expect("tempdir");
    let db_url = format!("sqlite://{}", temp.path().join("poc-backfill.db").display());
    let state = build_state(&ApiRuntimeConfig::for_test(db_url))
        .await
        .expect("build state")
        .with_history_source(history);
    (router_for_state(state), temp)
}

#[tokio::test]
async fn empty_log_triggers_backfill() {
    let history = Arc::new(CountingHistory {
        calls: AtomicUsize::new(0),
        txs: vec![TransactionRecord {
            hash: "0xfeed".to_string(),
            kind: TransactionKind::Stake,
            amount: "0.01".to_string(),
            course_id: "1".to_string(),
            timestamp: 1_700_000_000,
            status: TransactionStatus::Success,
            block_number: Some(12),
            certificate_cid: None,
            reason: None,
        }],
    });
    let (app, _temp) = app_with_history(history.clone()).await;

    let uri = format!("/v1/transactions?userAddress={}", LEARNER);
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transactions"][0]["hash"], "0xfeed");
    assert_eq!(body["transactions"][0]["blockNumber"], 12);

    send(&app, "GET", &uri, None).await;
    assert_eq!(history.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn backfill_respects_cooldown() {
    let history = Arc::new(CountingHistory {
        calls: AtomicUsize::new(0),
        txs: Vec::new(),
    });
    let (app, _temp) = app_with_history(history.clone()).await;

    let uri = format!("/v1/transactions?userAddress={}", REVIEWER);
    for _ in 0..3 {
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transactions"].as_array().map(Vec::len), Some(0));
    }
    assert_eq!(history.calls.load(Ordering::SeqCst), 1);
}
