//! Learning progress storage operations.
//!
//! Each record is stored as a JSON document guarded by a `version` column.
//! Writers go through [`Storage::update_progress_with`], which reloads the
//! record, applies a mutation and writes it back only if nobody else wrote
//! in between.

use super::{address_column, unix_now, Storage, StorageError};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use poc_core::LearningProgress;
use sqlx::Row;
use tracing::debug;

/// Attempts before a contended update gives up.
const MAX_CAS_ATTEMPTS: usize = 5;

impl Storage {
    /// Insert a new progress record.
    ///
    /// Fails with [`StorageError::Conflict`] if the learner is already
    /// enrolled in the course.
    pub async fn create_progress(
        &self,
        progress: &LearningProgress,
    ) -> Result<LearningProgress, StorageError> {
        let inserted = self.insert_progress(progress).await?;
        if !inserted {
            return Err(StorageError::Conflict(format!(
                "Progress for course {} already exists",
                progress.course_id
            )));
        }
        self.get_progress(&progress.user_address, progress.course_id)
            .await?
            .ok_or(StorageError::NotFound("Learning progress"))
    }

    /// Insert `initial` unless a record exists, then return the stored record.
    pub async fn ensure_progress(
        &self,
        initial: &LearningProgress,
    ) -> Result<LearningProgress, StorageError> {
        self.insert_progress(initial).await?;
        self.get_progress(&initial.user_address, initial.course_id)
            .await?
            .ok_or(StorageError::NotFound("Learning progress"))
    }

    async fn insert_progress(&self, progress: &LearningProgress) -> Result<bool> {
        let now = unix_now();
        let state_json = serde_json::to_string(progress)?;

        let result = sqlx::query(
            r#"
            INSERT INTO learning_progress (
                user_address, course_id, state_json, version, course_completed,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_address, course_id) DO NOTHING
            "#,
        )
        .bind(address_column(&progress.user_address))
        .bind(progress.course_id as i64)
        .bind(state_json)
        .bind(progress.version)
        .bind(progress.course_completed)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert learning progress")?;

        Ok(result.rows_affected() > 0)
    }

    /// Get the progress of a learner in a course.
    pub async fn get_progress(
        &self,
        user: &Address,
        course_id: u64,
    ) -> Result<Option<LearningProgress>> {
        let row = sqlx::query(
            r#"
            SELECT state_json, version
            FROM learning_progress
            WHERE user_address = ? AND course_id = ?
            "#,
        )
        .bind(address_column(user))
        .bind(course_id as i64)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch learning progress")?;

        row.map(Self::row_to_progress).transpose()
    }

    /// All progress records of a learner ordered by course id.
    pub async fn list_progress_for_user(&self, user: &Address) -> Result<Vec<LearningProgress>> {
        let rows = sqlx::query(
            r#"
            SELECT state_json, version
            FROM learning_progress
            WHERE user_address = ?
            ORDER BY course_id
            "#,
        )
        .bind(address_column(user))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list learning progress")?;

        rows.into_iter().map(Self::row_to_progress).collect()
    }

    /// Apply `mutate` to the stored record with compare-and-swap.
    ///
    /// The closure may run several times and must only touch the record it
    /// is given. Its error aborts the update and is returned unchanged.
    pub async fn update_progress_with<T, F>(
        &self,
        user: &Address,
        course_id: u64,
        mut mutate: F,
    ) -> Result<(LearningProgress, T), StorageError>
    where
        F: FnMut(&mut LearningProgress) -> Result<T, StorageError>,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut progress = self
                .get_progress(user, course_id)
                .await?
                .ok_or(StorageError::NotFound("Learning progress"))?;
            let expected = progress.version;

            let output = mutate(&mut progress)?;
            progress.version = expected + 1;

            let state_json = serde_json::to_string(&progress)?;
            let result = sqlx::query(
                r#"
                UPDATE learning_progress
                SET state_json = ?, version = ?, course_completed = ?, updated_at = ?
                WHERE user_address = ? AND course_id = ? AND version = ?
                "#,
            )
            .bind(state_json)
            .bind(progress.version)
            .bind(progress.course_completed)
            .bind(unix_now())
            .bind(address_column(user))
            .bind(course_id as i64)
            .bind(expected)
            .execute(&self.pool)
            .await
            .context("Failed to update learning progress")?;

            if result.rows_affected() == 1 {
                return Ok((progress, output));
            }

            debug!(
                user = %user,
                course_id,
                attempt,
                "Learning progress changed concurrently, retrying"
            );
        }

        Err(StorageError::Contended)
    }

    /// Delete a progress record. Returns false if it did not exist.
    pub async fn delete_progress(&self, user: &Address, course_id: u64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM learning_progress WHERE user_address = ? AND course_id = ?")
                .bind(address_column(user))
                .bind(course_id as i64)
                .execute(&self.pool)
                .await
                .context("Failed to delete learning progress")?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_progress(row: sqlx::sqlite::SqliteRow) -> Result<LearningProgress> {
        let state_json: String = row.get("state_json");
        let mut progress: LearningProgress =
            serde_json::from_str(&state_json).context("Invalid stored learning progress")?;
        // The column is authoritative for compare-and-swap.
        progress.version = row.get("version");
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::setup_storage;
    use poc_core::ProgressError;
    use std::sync::Arc;

    fn enrollment(user: Address) -> LearningProgress {
        LearningProgress::enroll(user, 1, "0.01", true, 4, 1_700_000_000).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_progress() {
        let (storage, _temp_db) = setup_storage().await;
        let user = Address::repeat_byte(0x11);

        let created = storage.create_progress(&enrollment(user)).await.unwrap();
        assert_eq!(created.total_modules(), 4);
        assert_eq!(created.version, 0);

        let err = storage.create_progress(&enrollment(user)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let fetched = storage.get_progress(&user, 1).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(storage.get_progress(&user, 2).await.unwrap().is_none());
        assert_eq!(storage.list_progress_for_user(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_progress_keeps_existing_record() {
        let (storage, _temp_db) = setup_storage().await;
        let user = Address::repeat_byte(0x11);

        storage.create_progress(&enrollment(user)).await.unwrap();
        storage
            .update_progress_with(&user, 1, |p| {
                p.complete_module(1, 1_700_000_100)?;
                Ok(())
            })
            .await
            .unwrap();

        let ensured = storage.ensure_progress(&enrollment(user)).await.unwrap();
        assert_eq!(ensured.completed_modules, 1);
        assert_eq!(ensured.version, 1);
    }

    #[tokio::test]
    async fn test_update_propagates_state_machine_errors() {
        let (storage, _temp_db) = setup_storage().await;
        let user = Address::repeat_byte(0x11);
        storage.create_progress(&enrollment(user)).await.unwrap();

        let err = storage
            .update_progress_with(&user, 1, |p| {
                p.complete_module(3, 1_700_000_100)?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Progress(ProgressError::ModuleLocked(3))
        ));

        // Nothing was written
        let stored = storage.get_progress(&user, 1).await.unwrap().unwrap();
        assert_eq!(stored.version, 0);

        let missing = storage
            .update_progress_with(&Address::repeat_byte(0x22), 1, |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(missing, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_are_not_lost() {
        let (storage, _temp_db) = setup_storage().await;
        let storage = Arc::new(storage);
        let user = Address::repeat_byte(0x11);
        storage.create_progress(&enrollment(user)).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage
                        .update_progress_with(&user, 1, |p| {
                            p.submit_assignment(
                                &format!("a{i}"),
                                format!("https://github.com/x/{i}"),
                                1_700_000_100,
                            );
                            Ok(())
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = storage.get_progress(&user, 1).await.unwrap().unwrap();
        assert_eq!(stored.assignments.len(), 4);
        assert_eq!(stored.version, 4);
    }

    #[tokio::test]
    async fn test_concurrent_module_completion_succeeds_once() {
        let (storage, _temp_db) = setup_storage().await;
        let storage = Arc::new(storage);
        let user = Address::repeat_byte(0x11);
        storage.create_progress(&enrollment(user)).await.unwrap();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage
                        .update_progress_with(&user, 1, |p| {
                            p.complete_module(1, 1_700_000_100)?;
                            Ok(())
                        })
                        .await
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(StorageError::Progress(ProgressError::ModuleAlreadyCompleted(1))) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(succeeded, 1);

        let stored = storage.get_progress(&user, 1).await.unwrap().unwrap();
        assert_eq!(stored.completed_modules, 1);
        assert!(stored.is_module_unlocked(2));
    }

    #[tokio::test]
    async fn test_concurrent_claims_on_different_modules_all_persist() {
        let (storage, _temp_db) = setup_storage().await;
        let storage = Arc::new(storage);
        let user = Address::repeat_byte(0x11);
        storage.create_progress(&enrollment(user)).await.unwrap();
        for module_id in 1..=4 {
            storage
                .update_progress_with(&user, 1, |p| {
                    p.complete_module(module_id, 1_700_000_100)?;
                    Ok(())
                })
                .await
                .unwrap();
        }

        let handles: Vec<_> = (1..=4u32)
            .map(|module_id| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage
                        .update_progress_with(&user, 1, |p| {
                            Ok(p.claim_module_reward(module_id, 3, 1_700_000_200)?)
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let (_, completed_now) = handle.await.unwrap().unwrap();
            assert!(!completed_now);
        }

        let stored = storage.get_progress(&user, 1).await.unwrap().unwrap();
        assert!(stored.modules.iter().all(|m| m.reward_earned == Some(3)));
        assert_eq!(stored.version, 8);
    }

    #[tokio::test]
    async fn test_unstaked_record_can_be_staked_later() {
        let (storage, _temp_db) = setup_storage().await;
        let user = Address::repeat_byte(0x11);
        let unstaked = LearningProgress::enroll(user, 1, "0", false, 4, 1_700_000_000).unwrap();
        storage.ensure_progress(&unstaked).await.unwrap();

        let err = storage.create_progress(&enrollment(user)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let (staked, ()) = storage
            .update_progress_with(&user, 1, |p| {
                p.record_stake("0.01", 1_700_000_100)?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(staked.is_staked);
        assert_eq!(staked.stake_amount, "0.01");

        let again = storage
            .update_progress_with(&user, 1, |p| {
                p.record_stake("0.01", 1_700_000_200)?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(
            again,
            StorageError::Progress(ProgressError::AlreadyStaked)
        ));
    }

    #[tokio::test]
    async fn test_delete_progress() {
        let (storage, _temp_db) = setup_storage().await;
        let user = Address::repeat_byte(0x11);
        storage.create_progress(&enrollment(user)).await.unwrap();

        assert!(storage.delete_progress(&user, 1).await.unwrap());
        assert!(!storage.delete_progress(&user, 1).await.unwrap());
        assert!(storage.get_progress(&user, 1).await.unwrap().is_none());
    }
}
