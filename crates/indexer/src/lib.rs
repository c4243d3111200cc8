//! Storage, chain ingestion and reward services for Proof of Contribution.
//!
//! This crate provides:
//! - SQLite storage for users, courses, learning progress, transactions,
//!   repositories and certificates
//! - Event listener for StakingManager and DataCoin events
//! - DataCoin reward minting
//! - Reputation contract reads
//! - Certificate sealing, pinning and contribution verification clients
//! - Witness verification of consumer data claims
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  poc-indexer (this)          │
//! │                              │
//! │  ┌─────────────────┐         │
//! │  │  Sync Engine    │ ← Ethereum RPC
//! │  │   (tokio task)  │   Staked / CourseCompleted /
//! │  └────────┬────────┘   StakeRefunded / TokensMinted
//! │           │                  │
//! │      ┌────▼──────┐           │
//! │      │  Storage  │ ← SQLite  │
//! │      └───────────┘           │
//! └──────────────────────────────┘
//!          │
//!          │ Shared DB
//!          │
//! ┌────────▼──────────────────────┐
//! │   poc-api (separate)          │
//! │   axum JSON endpoints         │
//! │   + RewardMinter              │
//! │   + CertificatePinner         │
//! │   + AI verifier / GitHub      │
//! └───────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attestation;
pub mod config;
pub mod listener;
pub mod logging;
pub mod minter;
pub mod pinning;
pub mod reputation;
pub mod sealing;
pub mod storage;
pub mod verification;

// Re-export common types
pub use poc_core::{types::*, *};
