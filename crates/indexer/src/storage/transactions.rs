//! Transaction log storage operations.

use super::{address_column, parse_address_column, unix_now, Storage, TransactionSource};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use poc_core::{sort_newest_first, TransactionKind, TransactionRecord, TransactionStatus};
use sqlx::Row;

const TRANSACTION_COLUMNS: &str = r#"
    hash, kind, amount, course_id, timestamp, status, block_number,
    certificate_cid, reason
"#;

impl Storage {
    /// Record a transaction for a user.
    ///
    /// Returns false when the same (user, hash, kind) entry already exists.
    pub async fn insert_transaction(
        &self,
        user: &Address,
        tx: &TransactionRecord,
        source: TransactionSource,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (
                user_address, hash, kind, amount, course_id, timestamp, status,
                block_number, certificate_cid, reason, source, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_address, hash, kind) DO NOTHING
            "#,
        )
        .bind(address_column(user))
        .bind(&tx.hash)
        .bind(tx.kind.as_str())
        .bind(&tx.amount)
        .bind(&tx.course_id)
        .bind(tx.timestamp)
        .bind(tx.status.as_str())
        .bind(tx.block_number.map(|n| n as i64))
        .bind(&tx.certificate_cid)
        .bind(&tx.reason)
        .bind(source.as_str())
        .bind(unix_now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert transaction {}", tx.hash))?;

        Ok(result.rows_affected() > 0)
    }

    /// Transactions of a user, newest first.
    pub async fn list_transactions(&self, user: &Address) -> Result<Vec<TransactionRecord>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE user_address = ?",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(address_column(user))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        let mut txs = rows
            .into_iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()?;
        sort_newest_first(&mut txs);
        Ok(txs)
    }

    /// Transactions of one kind for a user, newest first.
    pub async fn list_transactions_by_kind(
        &self,
        user: &Address,
        kind: TransactionKind,
    ) -> Result<Vec<TransactionRecord>> {
        let mut txs = self.list_transactions(user).await?;
        txs.retain(|tx| tx.kind == kind);
        Ok(txs)
    }

    /// Every user with at least one transaction.
    pub async fn list_transaction_users(&self) -> Result<Vec<Address>> {
        let rows = sqlx::query(
            "SELECT DISTINCT user_address FROM transactions ORDER BY user_address",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transaction users")?;

        rows.into_iter()
            .map(|row| {
                let address: String = row.get("user_address");
                parse_address_column(&address)
            })
            .collect()
    }

    fn row_to_transaction(row: sqlx::sqlite::SqliteRow) -> Result<TransactionRecord> {
        let kind: String = row.get("kind");
        let status: String = row.get("status");

        Ok(TransactionRecord {
            hash: row.get("hash"),
            kind: kind.parse::<TransactionKind>()?,
            amount: row.get("amount"),
            course_id: row.get("course_id"),
            timestamp: row.get("timestamp"),
            status: status.parse::<TransactionStatus>()?,
            block_number: row
                .get::<Option<i64>, _>("block_number")
                .map(|n| n as u64),
            certificate_cid: row.get("certificate_cid"),
            reason: row.get("reason"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::setup_storage;

    fn tx(hash: &str, kind: TransactionKind, timestamp: i64) -> TransactionRecord {
        TransactionRecord {
            hash: hash.to_string(),
            kind,
            amount: "3".to_string(),
            course_id: "1".to_string(),
            timestamp,
            status: TransactionStatus::Success,
            block_number: Some(42),
            certificate_cid: None,
            reason: Some("module_completion".to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_and_list_transactions() {
        let (storage, _temp_db) = setup_storage().await;
        let user = Address::repeat_byte(0x11);

        assert!(storage
            .insert_transaction(&user, &tx("0x01", TransactionKind::Stake, 100), TransactionSource::Chain)
            .await
            .unwrap());
        assert!(storage
            .insert_transaction(&user, &tx("0x02", TransactionKind::Datacoin, 200), TransactionSource::Api)
            .await
            .unwrap());

        let txs = storage.list_transactions(&user).await.unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].hash, "0x02");
        assert_eq!(txs[1].block_number, Some(42));

        let stakes = storage
            .list_transactions_by_kind(&user, TransactionKind::Stake)
            .await
            .unwrap();
        assert_eq!(stakes.len(), 1);

        assert!(storage
            .list_transactions(&Address::repeat_byte(0x22))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_transactions_are_ignored() {
        let (storage, _temp_db) = setup_storage().await;
        let user = Address::repeat_byte(0x11);
        let record = tx("0x01", TransactionKind::Complete, 100);

        assert!(storage
            .insert_transaction(&user, &record, TransactionSource::Api)
            .await
            .unwrap());
        // Same event arriving from the chain listener
        assert!(!storage
            .insert_transaction(&user, &record, TransactionSource::Chain)
            .await
            .unwrap());

        // Same hash with another kind is a separate entry
        let mint = tx("0x01", TransactionKind::Mint, 100);
        assert!(storage
            .insert_transaction(&user, &mint, TransactionSource::Api)
            .await
            .unwrap());

        assert_eq!(storage.list_transactions(&user).await.unwrap().len(), 2);
        assert_eq!(storage.list_transaction_users().await.unwrap(), vec![user]);
    }
}
