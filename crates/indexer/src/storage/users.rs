//! User storage operations.

use super::{address_column, parse_address_column, unix_now, Storage, StorageError, User};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use sqlx::Row;

impl Storage {
    /// Register a user.
    ///
    /// Fails with [`StorageError::Conflict`] when the wallet is already
    /// registered or the email (case-insensitive) belongs to another user.
    pub async fn create_user(
        &self,
        address: &Address,
        name: &str,
        email: &str,
    ) -> Result<User, StorageError> {
        let now = unix_now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (address, name, email, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(address_column(address))
        .bind(name)
        .bind(email.trim())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(User {
                address: *address,
                name: name.to_string(),
                email: email.trim().to_string(),
                created_at: now,
                updated_at: now,
            }),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                if db.message().contains("users.email") {
                    Err(StorageError::Conflict(format!(
                        "Email {} is already registered",
                        email.trim()
                    )))
                } else {
                    Err(StorageError::Conflict(format!(
                        "User {} is already registered",
                        address_column(address)
                    )))
                }
            }
            Err(e) => Err(StorageError::Other(
                anyhow::Error::new(e).context("Failed to insert user"),
            )),
        }
    }

    /// Get a user by wallet address.
    pub async fn get_user(&self, address: &Address) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT address, name, email, created_at, updated_at
            FROM users
            WHERE address = ?
            "#,
        )
        .bind(address_column(address))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        row.map(|row| {
            let address: String = row.get("address");
            Ok(User {
                address: parse_address_column(&address)?,
                name: row.get("name"),
                email: row.get("email"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::setup_storage;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (storage, _temp_db) = setup_storage().await;
        let addr = Address::repeat_byte(0x11);

        let user = storage
            .create_user(&addr, "Ada", " ada@example.com ")
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");

        let fetched = storage.get_user(&addr).await.unwrap().unwrap();
        assert_eq!(fetched, user);

        assert!(storage
            .get_user(&Address::repeat_byte(0x22))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let (storage, _temp_db) = setup_storage().await;

        storage
            .create_user(&Address::repeat_byte(0x11), "Ada", "ada@example.com")
            .await
            .unwrap();

        let err = storage
            .create_user(&Address::repeat_byte(0x22), "Eve", "ADA@example.com")
            .await
            .unwrap_err();
        match err {
            StorageError::Conflict(msg) => assert!(msg.contains("Email")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_address_is_rejected() {
        let (storage, _temp_db) = setup_storage().await;
        let addr = Address::repeat_byte(0x11);

        storage.create_user(&addr, "Ada", "a@example.com").await.unwrap();
        let err = storage
            .create_user(&addr, "Ada", "b@example.com")
            .await
            .unwrap_err();
        match err {
            StorageError::Conflict(msg) => assert!(msg.contains("User")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
