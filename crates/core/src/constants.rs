//! Canonical constants for Proof of Contribution.
//!
//! Values shared by the API, the indexer and the CLI. Contract-facing values
//! must match the deployed contracts.

/// Decimals of the DataCoin ERC-20 token and of ETH.
pub const TOKEN_DECIMALS: u8 = 18;

/// DataCoins allocated per completed module when a course certificate is issued.
pub const DATACOINS_PER_MODULE: u64 = 3;

/// Module count used when a progress record is initialised without an explicit total.
pub const DEFAULT_TOTAL_MODULES: u32 = 4;

/// EIP-712 domain name of the ProofOfContribution contract.
pub const PERMIT_DOMAIN_NAME: &str = "ProofOfContribution";

/// EIP-712 domain version of the ProofOfContribution contract.
pub const PERMIT_DOMAIN_VERSION: &str = "1";

/// Reputation granted by a manually verified contribution permit.
pub const MANUAL_PERMIT_REPUTATION: u64 = 10;

/// Validity window of a contribution permit, in seconds.
pub const PERMIT_TTL_SECS: u64 = 3600;

/// Token URI used until contribution metadata has been pinned.
pub const PENDING_TOKEN_URI: &str = "ipfs://pending";

/// Public IPFS gateway used in certificate metadata.
pub const IPFS_GATEWAY_BASE: &str = "https://gateway.lighthouse.storage/ipfs/";

/// Reputation points for a completed course.
pub const REPUTATION_COURSE_COMPLETION: u64 = 50;

/// Reputation points for a minted SBT.
pub const REPUTATION_SBT_MINT: u64 = 25;

/// Reputation points for a stake.
pub const REPUTATION_STAKE: u64 = 5;

/// Reputation points per DataCoin earned.
pub const REPUTATION_PER_DATACOIN: f64 = 2.0;

/// Number of reputation gains kept in the recent list.
pub const RECENT_GAINS_LIMIT: usize = 10;

/// Number of SBTs kept in the recent list.
pub const RECENT_SBT_LIMIT: usize = 5;

/// Number of entries in the activity feed.
pub const ACTIVITY_FEED_LIMIT: usize = 10;
