//! Contribution permits.
//!
//! A permit authorises the ProofOfContribution contract to mint a soulbound
//! token and award reputation for one verified commit. Permits are EIP-712
//! typed data signed by the verifier key; the contract recovers the signer
//! on-chain, so the encoding here must match it exactly.

use alloy_primitives::{Address, PrimitiveSignature, B256, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;

use crate::constants::{PERMIT_DOMAIN_NAME, PERMIT_DOMAIN_VERSION};
use crate::error::CoreError;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    struct Permit {
        address to;
        bytes32 commitHash;
        uint256 reputation;
        uint256 expiry;
        string tokenURI;
    }
}

/// EIP-712 domain of a deployed ProofOfContribution contract.
pub fn permit_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed(PERMIT_DOMAIN_NAME)),
        Some(Cow::Borrowed(PERMIT_DOMAIN_VERSION)),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    )
}

/// Unsigned permit fields in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitData {
    /// Recipient of the SBT.
    pub to: Address,
    /// Commit identifier, see [`commit_hash`].
    pub commit_hash: B256,
    /// Reputation to award.
    pub reputation: u64,
    /// Expiry as unix seconds.
    pub expiry: u64,
    /// Metadata URI of the SBT.
    #[serde(rename = "tokenURI")]
    pub token_uri: String,
}

impl PermitData {
    /// Typed-data struct for hashing.
    pub fn to_permit(&self) -> Permit {
        Permit {
            to: self.to,
            commitHash: self.commit_hash,
            reputation: U256::from(self.reputation),
            expiry: U256::from(self.expiry),
            tokenURI: self.token_uri.clone(),
        }
    }

    /// EIP-712 digest the verifier signs.
    pub fn signing_hash(&self, domain: &Eip712Domain) -> B256 {
        self.to_permit().eip712_signing_hash(domain)
    }

    /// Whether the permit is still usable at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry <= now
    }
}

/// Permit plus its 65-byte signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPermit {
    /// Signed fields.
    #[serde(flatten)]
    pub permit: PermitData,
    /// `0x`-prefixed `r || s || v` signature.
    pub signature: String,
}

impl SignedPermit {
    /// Recover the signing address.
    pub fn recover_signer(&self, domain: &Eip712Domain) -> Result<Address, CoreError> {
        let raw = hex::decode(self.signature.trim_start_matches("0x"))
            .map_err(|_| CoreError::InvalidHex)?;
        let sig = PrimitiveSignature::try_from(raw.as_slice())
            .map_err(|e| CoreError::InvalidSignature(e.to_string()))?;
        sig.recover_address_from_prehash(&self.permit.signing_hash(domain))
            .map_err(|e| CoreError::InvalidSignature(e.to_string()))
    }
}

/// Identifier of a commit across repositories: `sha256("repo|sha|email")`.
pub fn commit_hash(repo: &str, sha: &str, author_email: &str) -> B256 {
    let digest = Sha256::digest(format!("{}|{}|{}", repo, sha, author_email).as_bytes());
    B256::from_slice(&digest)
}

/// Offline contribution score in `1..=100`.
///
/// Ten changed diff lines earn one point; fixes earn a five point bonus.
pub fn score_commit(message: &str, diff: &str) -> u64 {
    let lines = diff.lines().count() as u64;
    let bonus = if message.to_lowercase().contains("fix") {
        5
    } else {
        0
    };
    (lines / 10 + bonus).clamp(1, 100)
}

/// NFT metadata describing a verified contribution.
///
/// The reputation attribute is omitted when the score is not known yet.
pub fn contribution_metadata(
    repo: &str,
    sha: &str,
    reputation: Option<u64>,
    verification: &str,
) -> serde_json::Value {
    let short = sha.get(..7).unwrap_or(sha);
    let mut attributes = vec![
        serde_json::json!({ "trait_type": "Repository", "value": repo }),
        serde_json::json!({ "trait_type": "Commit", "value": sha }),
        serde_json::json!({ "trait_type": "Verification", "value": verification }),
    ];
    if let Some(reputation) = reputation {
        attributes.push(serde_json::json!({ "trait_type": "Reputation", "value": reputation }));
    }

    serde_json::json!({
        "name": "Proof of Contribution",
        "description": format!("Verified contribution {} to {}", short, repo),
        "external_url": format!("https://github.com/{}/commit/{}", repo, sha),
        "attributes": attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_hash_vector() {
        let expected = Sha256::digest(b"octo/repo|abc123|dev@example.com");
        assert_eq!(
            commit_hash("octo/repo", "abc123", "dev@example.com"),
            B256::from_slice(&expected)
        );
        assert_ne!(
            commit_hash("octo/repo", "abc123", "dev@example.com"),
            commit_hash("octo/repo", "abc124", "dev@example.com")
        );
    }

    #[test]
    fn test_score_commit() {
        assert_eq!(score_commit("docs", ""), 1);
        let diff = "+line\n".repeat(45);
        assert_eq!(score_commit("add feature", &diff), 4);
        assert_eq!(score_commit("Fix overflow", &diff), 9);
        let huge = "+x\n".repeat(5_000);
        assert_eq!(score_commit("fix", &huge), 100);
    }

    #[test]
    fn test_domain_separator_depends_on_chain() {
        let contract = Address::repeat_byte(0x42);
        let a = permit_domain(1, contract).separator();
        let b = permit_domain(11155111, contract).separator();
        assert_ne!(a, b);
    }

    #[test]
    fn test_signing_hash_covers_every_field() {
        let domain = permit_domain(1, Address::repeat_byte(0x42));
        let base = PermitData {
            to: Address::repeat_byte(0x01),
            commit_hash: B256::repeat_byte(0x02),
            reputation: 10,
            expiry: 1_700_003_600,
            token_uri: "ipfs://pending".to_string(),
        };
        let h = base.signing_hash(&domain);

        let mut changed = base.clone();
        changed.reputation = 11;
        assert_ne!(changed.signing_hash(&domain), h);

        let mut changed = base.clone();
        changed.token_uri = "ipfs://bafy".to_string();
        assert_ne!(changed.signing_hash(&domain), h);
    }

    #[test]
    fn test_recover_rejects_garbage_signature() {
        let domain = permit_domain(1, Address::repeat_byte(0x42));
        let signed = SignedPermit {
            permit: PermitData {
                to: Address::repeat_byte(0x01),
                commit_hash: B256::ZERO,
                reputation: 1,
                expiry: 1,
                token_uri: String::new(),
            },
            signature: format!("0x{}", hex::encode([0u8; 10])),
        };
        assert!(signed.recover_signer(&domain).is_err());
    }

    #[test]
    fn test_contribution_metadata() {
        let meta = contribution_metadata("octo/repo", "abcdef1234", Some(10), "manual");
        assert_eq!(
            meta["external_url"],
            "https://github.com/octo/repo/commit/abcdef1234"
        );
        assert_eq!(meta["description"], "Verified contribution abcdef1 to octo/repo");
        assert_eq!(meta["attributes"][2]["value"], "manual");
        assert_eq!(meta["attributes"][3]["value"], 10);

        let pending = contribution_metadata("octo/repo", "abcdef1234", None, "ai");
        assert_eq!(pending["attributes"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_permit_wire_names() {
        let permit = PermitData {
            to: Address::repeat_byte(0x01),
            commit_hash: B256::ZERO,
            reputation: 10,
            expiry: 5,
            token_uri: "ipfs://pending".to_string(),
        };
        let json = serde_json::to_value(SignedPermit {
            permit,
            signature: "0x00".to_string(),
        })
        .unwrap();
        assert!(json.get("commitHash").is_some());
        assert_eq!(json["tokenURI"], "ipfs://pending");
        assert_eq!(json["signature"], "0x00");
    }
}
