//! Consumer data contribution storage operations.

use super::{
    address_column, parse_address_column, unix_now, ConsumerContribution, SourceTotals, Storage,
    StorageError,
};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use poc_core::consumer::{ConsumerData, DataSource};
use poc_core::RewardType;
use sqlx::Row;
use std::collections::BTreeMap;

impl Storage {
    /// Record a contribution paying `data_coins`, plus the first-contribution
    /// bonus when the user has none yet.
    ///
    /// The first-contribution check and the insert are one statement, so two
    /// concurrent first contributions cannot both earn the bonus. A proof id
    /// seen before is a [`StorageError::Conflict`].
    pub async fn insert_consumer_data(
        &self,
        user: &Address,
        source: DataSource,
        proof_id: &str,
        data: &ConsumerData,
        data_coins: u64,
    ) -> Result<ConsumerContribution, StorageError> {
        let id = uuid::Uuid::new_v4().to_string();
        let user_key = address_column(user);
        let base = i64::try_from(data_coins)
            .map_err(|_| StorageError::Invalid(format!("DataCoin amount {} is too large", data_coins)))?;
        let bonus = RewardType::ConsumerDataVerified.amount() as i64;
        let created_at = unix_now();

        let result = sqlx::query(
            r#"
            INSERT INTO consumer_data (
                id, user_address, source, proof_id, data_json,
                first_contribution, data_coins, created_at
            )
            SELECT ?, ?, ?, ?, ?, is_first, ? + CASE WHEN is_first THEN ? ELSE 0 END, ?
            FROM (
                SELECT NOT EXISTS (
                    SELECT 1 FROM consumer_data WHERE user_address = ?
                ) AS is_first
            )
            RETURNING first_contribution, data_coins
            "#,
        )
        .bind(&id)
        .bind(&user_key)
        .bind(source.as_str())
        .bind(proof_id)
        .bind(serde_json::to_string(data)?)
        .bind(base)
        .bind(bonus)
        .bind(created_at)
        .bind(&user_key)
        .fetch_one(&self.pool)
        .await;

        let row = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(StorageError::Conflict(
                    "Proof has already been submitted".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ConsumerContribution {
            id,
            user_address: *user,
            source,
            proof_id: proof_id.to_string(),
            data: data.clone(),
            data_coins: row.get::<i64, _>("data_coins") as u64,
            first_contribution: row.get("first_contribution"),
            created_at,
        })
    }

    /// Drop a contribution whose payout never happened.
    pub async fn delete_consumer_data(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM consumer_data WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete consumer data {}", id))?;
        Ok(())
    }

    /// Contributions of a user, newest first.
    pub async fn list_consumer_data(&self, user: &Address) -> Result<Vec<ConsumerContribution>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_address, source, proof_id, data_json,
                   data_coins, first_contribution, created_at
            FROM consumer_data
            WHERE user_address = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(address_column(user))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list consumer data")?;

        rows.into_iter().map(Self::row_to_contribution).collect()
    }

    /// Totals of a user's contributions keyed by source.
    pub async fn consumer_data_totals(
        &self,
        user: &Address,
    ) -> Result<BTreeMap<DataSource, SourceTotals>> {
        let rows = sqlx::query(
            r#"
            SELECT source, COUNT(*) AS contributions, COALESCE(SUM(data_coins), 0) AS data_coins
            FROM consumer_data
            WHERE user_address = ?
            GROUP BY source
            "#,
        )
        .bind(address_column(user))
        .fetch_all(&self.pool)
        .await
        .context("Failed to total consumer data")?;

        rows.into_iter()
            .map(|row| {
                let source: String = row.get("source");
                Ok((
                    source.parse::<DataSource>()?,
                    SourceTotals {
                        contributions: row.get::<i64, _>("contributions") as u64,
                        data_coins: row.get::<i64, _>("data_coins") as u64,
                    },
                ))
            })
            .collect()
    }

    fn row_to_contribution(row: sqlx::sqlite::SqliteRow) -> Result<ConsumerContribution> {
        let address: String = row.get("user_address");
        let source: String = row.get("source");
        let data_json: String = row.get("data_json");

        Ok(ConsumerContribution {
            id: row.get("id"),
            user_address: parse_address_column(&address)?,
            source: source.parse()?,
            proof_id: row.get("proof_id"),
            data: serde_json::from_str(&data_json).context("Invalid stored consumer data")?,
            data_coins: row.get::<i64, _>("data_coins") as u64,
            first_contribution: row.get("first_contribution"),
            created_at: row.get("created_at"),
        })
    }
}
