//! # Proof of Contribution Core
//!
//! Domain types, reward rules and the learning-progress state machine shared
//! by the API, the indexer, the SDK and the CLI.
//!
//! Everything in this crate is pure: no I/O, no clocks. Callers pass `now`
//! explicitly so the state machine is deterministic under test.
//!
//! ## Features
//!
//! - **Types**: transactions, review statuses, difficulty tiers
//! - **Rewards**: DataCoin reward table and token unit conversion
//! - **Progress**: sequential module unlock, assignments, completion
//! - **Stats**: reputation, SBT counts and the activity feed
//! - **Permits**: EIP-712 contribution permits and commit scoring
//! - **Consumer data**: witness-signed claims and their DataCoin payout
//! - **Certificates**: canonical JSON and CIDv1 content identifiers

#![warn(missing_docs)]

pub mod certificate;
pub mod constants;
pub mod consumer;
pub mod error;
pub mod permit;
pub mod progress;
pub mod rewards;
pub mod stats;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use error::{CoreError, ProgressError, Result};
pub use progress::{CourseProgressView, LearningProgress};
pub use rewards::RewardType;
pub use types::*;

// Re-export Alloy primitives for convenience
pub use alloy_primitives::{Address, B256, U256};
