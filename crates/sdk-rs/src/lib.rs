//! # Proof of Contribution SDK
//!
//! Client-side access to a user's transaction log.
//!
//! [`TransactionsClient`] keeps one cached list per connected wallet, refreshes
//! it on a TTL and coalesces bursts of refresh requests. The derived dashboard
//! statistics are computed locally with `poc_core::stats`.
//!
//! ```no_run
//! use poc_sdk::{HttpTransactionSource, TransactionsClient};
//!
//! # async fn demo() -> Result<(), poc_sdk::SdkError> {
//! let source = HttpTransactionSource::new("http://localhost:8080")?;
//! let client = TransactionsClient::new(source);
//! let wallet = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse().unwrap();
//! let txs = client.fetch(wallet, false).await?;
//! println!("{} transactions", txs.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod source;

pub use client::{ClientConfig, TransactionsClient, DEFAULT_CACHE_TTL, DEFAULT_DEBOUNCE};
pub use error::{Result, SdkError};
pub use source::{HttpTransactionSource, NewTransaction, TransactionSource};
