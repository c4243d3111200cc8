//! Proof of Contribution JSON API.
//!
//! axum service over the shared SQLite store. Chain access, IPFS pinning and
//! the AI verifier are optional; without them the service runs offline with
//! simulated mints, local CIDs and manual permits.

#![warn(missing_docs)]

pub mod backfill;
pub mod error;
mod handlers;
mod payouts;
mod server;

pub use server::{
    build_app, build_state, router_for_state, run_from_env, run_with_config, ApiRuntimeConfig,
    AppState,
};
