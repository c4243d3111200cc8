//! Verification of witness-signed consumer data claims.

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use poc_core::consumer::ClaimProof;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

/// Checks that a claim proof was attested by trusted witnesses.
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    /// Accept or reject `proof`. The error message is shown to the caller.
    async fn verify(&self, proof: &ClaimProof) -> Result<()>;
}

/// Accepts proofs whose every signature recovers to a trusted witness.
#[derive(Debug, Clone)]
pub struct WitnessVerifier {
    witnesses: HashSet<Address>,
}

impl WitnessVerifier {
    /// Trust `witnesses`.
    pub fn new(witnesses: impl IntoIterator<Item = Address>) -> Result<Self> {
        let witnesses: HashSet<Address> = witnesses.into_iter().collect();
        if witnesses.is_empty() {
            bail!("At least one witness address is required");
        }
        Ok(Self { witnesses })
    }

    /// Build from `RECLAIM_WITNESSES`, a comma-separated address list.
    /// `None` when unset.
    pub fn from_env() -> Result<Option<Self>> {
        let Some(list) = std::env::var("RECLAIM_WITNESSES")
            .ok()
            .filter(|v| !v.trim().is_empty())
        else {
            return Ok(None);
        };

        let witnesses = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Address::from_str(s).with_context(|| format!("Invalid witness address: {}", s))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(witnesses).map(Some)
    }
}

#[async_trait]
impl ProofVerifier for WitnessVerifier {
    async fn verify(&self, proof: &ClaimProof) -> Result<()> {
        if !proof.claim_data.identifier_matches() {
            bail!("Claim identifier does not match the claim");
        }
        if proof.signatures.is_empty() {
            bail!("Proof carries no witness signatures");
        }

        let signers = proof.signers().context("Invalid witness signature")?;
        if let Some(unknown) = signers.iter().find(|s| !self.witnesses.contains(*s)) {
            bail!("Proof signed by unknown witness {}", unknown);
        }

        debug!(
            "Verified claim {} with {} witness signature(s)",
            proof.claim_data.identifier,
            signers.len()
        );
        Ok(())
    }
}
