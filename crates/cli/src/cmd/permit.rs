use anyhow::{Context, Result};
use clap::Args;
use poc_core::{
    normalize_address,
    permit::{score_commit, PermitData},
    Address, PENDING_TOKEN_URI, PERMIT_TTL_SECS,
};
use poc_indexer::{
    config::validate_private_key,
    verification::{parse_repository, CommitDiff, GithubClient, PermitSigner},
};
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct SignPermitArgs {
    /// Verifier private key (32-byte hex, with or without 0x)
    #[arg(long, env = "PERMIT_SIGNER_KEY", hide_env_values = true)]
    key: String,

    /// Chain id of the EIP-712 domain
    #[arg(long, env = "CHAIN_ID", default_value_t = 11155111)]
    chain_id: u64,

    /// SBT contract address (0x...)
    #[arg(long, env = "SBT_ADDRESS")]
    contract: String,

    /// Recipient wallet (0x...)
    #[arg(long)]
    to: String,

    /// Repository, as owner/name or a GitHub URL
    #[arg(long)]
    repo: String,

    /// Commit SHA
    #[arg(long)]
    sha: String,

    /// Metadata URI stored in the SBT
    #[arg(long, default_value = PENDING_TOKEN_URI)]
    token_uri: String,

    /// Reputation override. Defaults to the manual-review amount.
    #[arg(long, conflicts_with = "score")]
    reputation: Option<u64>,

    /// Score the commit from its GitHub diff (uses GITHUB_TOKEN)
    #[arg(long)]
    score: bool,

    /// Output file path (defaults to stdout)
    #[arg(long)]
    out: Option<PathBuf>,
}

pub async fn run(args: SignPermitArgs) -> Result<()> {
    let scored = if args.score {
        let (owner, name) = parse_repository(&args.repo)
            .with_context(|| format!("Invalid --repo {}", args.repo))?;
        let github = GithubClient::from_env()?;
        Some(github.commit_diff(&format!("{}/{}", owner, name), &args.sha).await?)
    } else {
        None
    };

    let output = sign(&args, scored.as_ref(), chrono::Utc::now().timestamp() as u64)?;
    let rendered = serde_json::to_string_pretty(&output)?;
    match &args.out {
        Some(path) => std::fs::write(path, rendered + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Sign a permit. With a fetched commit the reputation comes from
/// [`score_commit`] and the commit hash binds the author email.
fn sign(
    args: &SignPermitArgs,
    scored: Option<&CommitDiff>,
    now: u64,
) -> Result<serde_json::Value> {
    validate_private_key("--key", &args.key)?;
    let contract = parse("contract", &args.contract)?;
    let to = parse("to", &args.to)?;
    let signer = PermitSigner::from_key(&args.key, args.chain_id, contract)?;

    let permit = match (scored, args.reputation) {
        (Some(commit), _) => signer.sign(PermitData {
            to,
            commit_hash: commit.commit_hash,
            reputation: score_commit(&commit.message, &commit.diff),
            expiry: now + PERMIT_TTL_SECS,
            token_uri: args.token_uri.clone(),
        })?,
        (None, Some(reputation)) => {
            let manual = signer.sign_manual(to, &args.repo, &args.sha, args.token_uri.clone(), now)?;
            signer.sign(PermitData {
                reputation,
                ..manual.permit
            })?
        }
        (None, None) => signer.sign_manual(to, &args.repo, &args.sha, args.token_uri.clone(), now)?,
    };

    Ok(json!({
        "permit": permit,
        "signer": signer.address(),
        "chainId": args.chain_id,
        "verifyingContract": contract,
    }))
}

fn parse(field: &str, raw: &str) -> Result<Address> {
    normalize_address(raw).with_context(|| format!("Invalid --{} address", field))
}
