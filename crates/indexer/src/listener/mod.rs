//! Event listener for StakingManager and DataCoin events.
//!
//! This module provides:
//! - Event type definitions and parsing
//! - RPC provider wrapper for Ethereum communication
//! - Sync engine for historical and live block processing
//! - On-demand per-user backfill

pub mod events;
pub mod provider;
pub mod sync;

pub use events::{ChainEvent, ChainEventKind};
pub use provider::{BlockInfo, HistorySource, RpcProvider};
pub use sync::{backfill_user, SyncEngine};
