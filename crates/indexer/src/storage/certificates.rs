//! Certificate storage operations.

use super::{address_column, parse_address_column, unix_now, CertificateRecord, Storage};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use poc_core::certificate::PinnedCertificate;
use sqlx::Row;

impl Storage {
    /// Store a pinned certificate. Re-inserting the same CID is a no-op.
    pub async fn insert_certificate(
        &self,
        user: &Address,
        course_id: u64,
        certificate: &PinnedCertificate,
    ) -> Result<()> {
        let document_json = serde_json::to_string(certificate)?;

        sqlx::query(
            r#"
            INSERT INTO certificates (cid, user_address, course_id, document_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(cid) DO NOTHING
            "#,
        )
        .bind(&certificate.cid)
        .bind(address_column(user))
        .bind(course_id as i64)
        .bind(document_json)
        .bind(unix_now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert certificate {}", certificate.cid))?;

        Ok(())
    }

    /// Get a certificate by CID.
    pub async fn get_certificate(&self, cid: &str) -> Result<Option<CertificateRecord>> {
        let row = sqlx::query(
            r#"
            SELECT user_address, course_id, document_json, created_at
            FROM certificates
            WHERE cid = ?
            "#,
        )
        .bind(cid)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch certificate")?;

        row.map(Self::row_to_certificate).transpose()
    }

    /// Certificates of a user, newest first.
    pub async fn list_certificates(&self, user: &Address) -> Result<Vec<CertificateRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT user_address, course_id, document_json, created_at
            FROM certificates
            WHERE user_address = ?
            ORDER BY created_at DESC, cid
            "#,
        )
        .bind(address_column(user))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list certificates")?;

        rows.into_iter().map(Self::row_to_certificate).collect()
    }

    fn row_to_certificate(row: sqlx::sqlite::SqliteRow) -> Result<CertificateRecord> {
        let address: String = row.get("user_address");
        let document_json: String = row.get("document_json");

        Ok(CertificateRecord {
            user_address: parse_address_column(&address)?,
            course_id: row.get::<i64, _>("course_id") as u64,
            certificate: serde_json::from_str(&document_json)
                .context("Invalid stored certificate")?,
            created_at: row.get("created_at"),
        })
    }
}
