//! DataCoin payouts: mint, then record the `datacoin` transaction.
//!
//! Once a mint has gone through the tokens are on chain, so nothing after
//! [`mint_datacoins`] may fail the payout. Logging the transaction is best
//! effort.

use anyhow::{Context, Result};
use poc_core::{
    rewards::to_base_units, Address, TransactionKind, TransactionRecord, TransactionStatus,
};
use poc_indexer::{minter::MintReceipt, storage::TransactionSource};
use tracing::{error, info, warn};

use crate::server::AppState;

/// Mint `whole_amount` DataCoins to `to`. `reason` is sent to the contract.
pub(crate) async fn mint_datacoins(
    state: &AppState,
    to: Address,
    whole_amount: u64,
    reason: &str,
) -> Result<MintReceipt> {
    state
        .minter
        .mint(to, to_base_units(whole_amount), reason)
        .await
        .with_context(|| format!("Failed to mint {} DataCoins to {:#x}", whole_amount, to))
}

/// Log the `datacoin` transaction for a mint that already happened.
///
/// `tag` becomes the transaction's reason and is what reward summaries group
/// by. A failed insert is logged and the record is still returned.
pub(crate) async fn record_award(
    state: &AppState,
    to: Address,
    whole_amount: u64,
    receipt: &MintReceipt,
    tag: &str,
    course_id: Option<u64>,
) -> TransactionRecord {
    let tx = TransactionRecord {
        hash: receipt.tx_hash.clone(),
        kind: TransactionKind::Datacoin,
        amount: whole_amount.to_string(),
        course_id: course_id.unwrap_or(0).to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        status: TransactionStatus::Success,
        block_number: None,
        certificate_cid: None,
        reason: Some(tag.to_string()),
    };

    if let Err(e) = state
        .storage
        .insert_transaction(&to, &tx, TransactionSource::Api)
        .await
    {
        error!(
            to = %to,
            tx_hash = %receipt.tx_hash,
            tag,
            "Minted DataCoins but failed to log the transaction: {:#}",
            e
        );
    }

    info!(
        to = %to,
        amount = whole_amount,
        tag,
        tx_hash = %receipt.tx_hash,
        simulated = receipt.simulated,
        "DataCoins awarded"
    );
    tx
}

/// Mint and record. Only the mint can fail.
pub(crate) async fn award_datacoins(
    state: &AppState,
    to: Address,
    whole_amount: u64,
    reason: &str,
    tag: &str,
    course_id: Option<u64>,
) -> Result<(MintReceipt, TransactionRecord)> {
    let receipt = mint_datacoins(state, to, whole_amount, reason).await?;
    let tx = record_award(state, to, whole_amount, &receipt, tag, course_id).await;
    Ok((receipt, tx))
}

/// Like [`award_datacoins`] but failures are logged and swallowed.
pub(crate) async fn try_award_datacoins(
    state: &AppState,
    to: Address,
    whole_amount: u64,
    reason: &str,
    tag: &str,
    course_id: Option<u64>,
) -> Option<(MintReceipt, TransactionRecord)> {
    match award_datacoins(state, to, whole_amount, reason, tag, course_id).await {
        Ok(awarded) => Some(awarded),
        Err(e) => {
            warn!(to = %to, amount = whole_amount, tag, "DataCoin award failed: {:#}", e);
            None
        }
    }
}
