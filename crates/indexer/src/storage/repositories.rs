//! Repository submission and commit review storage operations.

use super::{
    address_column, parse_address_column, unix_now, Commit, NewRepository, Repository,
    RepositoryStats, Storage, StorageError,
};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use poc_core::{CommitStatus, RepositoryStatus};
use sqlx::{Row, SqliteConnection};

const REPOSITORY_COLUMNS: &str = r#"
    id, user_address, user_name, user_email, github_username, repo_url,
    repo_name, repo_owner, description, language, stars, forks, is_private,
    status, submitted_at, reviewed_at, reviewed_by, data_coins_earned,
    total_commits, verified_commits
"#;

/// Review decision for a single commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReview {
    /// New commit status.
    pub status: CommitStatus,
    /// Reviewer wallet or name.
    pub verified_by: String,
    /// DataCoins granted for the commit.
    pub data_coins_earned: u64,
    /// Reviewer notes.
    pub notes: Option<String>,
}

impl Storage {
    /// Store a new submission with its initial commits. Returns the repository.
    pub async fn insert_repository(
        &self,
        details: &NewRepository,
        commits: &[Commit],
    ) -> Result<Repository> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO repositories (
                id, user_address, user_name, user_email, github_username, repo_url,
                repo_name, repo_owner, description, language, stars, forks,
                is_private, status, submitted_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(address_column(&details.user_address))
        .bind(&details.user_name)
        .bind(&details.user_email)
        .bind(&details.github_username)
        .bind(&details.repo_url)
        .bind(&details.repo_name)
        .bind(&details.repo_owner)
        .bind(&details.description)
        .bind(&details.language)
        .bind(details.stars as i64)
        .bind(details.forks as i64)
        .bind(details.is_private)
        .bind(RepositoryStatus::Pending.as_str())
        .bind(unix_now())
        .execute(&mut *tx)
        .await
        .context("Failed to insert repository")?;

        insert_commits(&mut *tx, &id, commits).await?;
        refresh_aggregates(&mut *tx, &id).await?;
        tx.commit().await.context("Failed to commit repository")?;

        self.get_repository(&id)
            .await?
            .context("Repository missing after insert")
    }

    /// Get a repository with its commits.
    pub async fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        let sql = format!("SELECT {} FROM repositories WHERE id = ?", REPOSITORY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch repository")?;

        match row {
            Some(row) => {
                let mut repository = Self::row_to_repository(row)?;
                repository.commits = self.list_commits(id).await?;
                Ok(Some(repository))
            }
            None => Ok(None),
        }
    }

    /// Repositories newest first, optionally only those of one user.
    pub async fn list_repositories(&self, user: Option<&Address>) -> Result<Vec<Repository>> {
        let rows = match user {
            Some(user) => {
                let sql = format!(
                    "SELECT {} FROM repositories WHERE user_address = ? ORDER BY submitted_at DESC, id",
                    REPOSITORY_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(address_column(user))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM repositories ORDER BY submitted_at DESC, id",
                    REPOSITORY_COLUMNS
                );
                sqlx::query(&sql).fetch_all(&self.pool).await
            }
        }
        .context("Failed to list repositories")?;

        let mut repositories = Vec::with_capacity(rows.len());
        for row in rows {
            let mut repository = Self::row_to_repository(row)?;
            repository.commits = self.list_commits(&repository.id).await?;
            repositories.push(repository);
        }
        Ok(repositories)
    }

    /// Record an admin decision on a repository.
    pub async fn update_repository_status(
        &self,
        id: &str,
        status: RepositoryStatus,
        reviewed_by: &str,
    ) -> Result<Repository, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE repositories
            SET status = ?, reviewed_at = ?, reviewed_by = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(unix_now())
        .bind(reviewed_by)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update repository status")?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("Repository"));
        }
        self.get_repository(id)
            .await?
            .ok_or(StorageError::NotFound("Repository"))
    }

    /// Append commits to a repository. Commits whose SHA is already present
    /// are skipped.
    pub async fn add_commits(
        &self,
        id: &str,
        commits: &[Commit],
    ) -> Result<Repository, StorageError> {
        let mut tx = self.pool.begin().await?;
        ensure_repository_exists(&mut *tx, id).await?;
        insert_commits(&mut *tx, id, commits).await?;
        refresh_aggregates(&mut *tx, id).await?;
        tx.commit().await?;

        self.get_repository(id)
            .await?
            .ok_or(StorageError::NotFound("Repository"))
    }

    /// Review a commit and refresh the repository aggregates in the same
    /// database transaction.
    pub async fn verify_commit(
        &self,
        id: &str,
        sha: &str,
        review: &CommitReview,
    ) -> Result<Repository, StorageError> {
        let coins = i64::try_from(review.data_coins_earned).map_err(|_| {
            StorageError::Invalid(format!(
                "dataCoinsEarned {} is out of range",
                review.data_coins_earned
            ))
        })?;

        let mut tx = self.pool.begin().await?;
        ensure_repository_exists(&mut *tx, id).await?;

        let result = sqlx::query(
            r#"
            UPDATE commits
            SET status = ?, verified_at = ?, verified_by = ?, data_coins_earned = ?,
                verification_notes = ?
            WHERE repository_id = ? AND sha = ?
            "#,
        )
        .bind(review.status.as_str())
        .bind(unix_now())
        .bind(&review.verified_by)
        .bind(coins)
        .bind(&review.notes)
        .bind(id)
        .bind(sha)
        .execute(&mut *tx)
        .await
        .context("Failed to update commit")?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("Commit"));
        }

        refresh_aggregates(&mut *tx, id).await?;
        tx.commit().await?;

        self.get_repository(id)
            .await?
            .ok_or(StorageError::NotFound("Repository"))
    }

    /// Aggregate review statistics across all repositories.
    pub async fn repository_stats(&self) -> Result<RepositoryStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(status = 'pending'), 0) AS pending,
                COALESCE(SUM(status = 'approved'), 0) AS approved,
                COALESCE(SUM(status = 'rejected'), 0) AS rejected,
                COALESCE(SUM(total_commits), 0) AS commits,
                COALESCE(SUM(verified_commits), 0) AS verified,
                COALESCE(SUM(data_coins_earned), 0) AS coins
            FROM repositories
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute repository stats")?;

        Ok(RepositoryStats {
            total_repositories: row.get::<i64, _>("total") as u64,
            pending_repositories: row.get::<i64, _>("pending") as u64,
            approved_repositories: row.get::<i64, _>("approved") as u64,
            rejected_repositories: row.get::<i64, _>("rejected") as u64,
            total_commits: row.get::<i64, _>("commits") as u64,
            verified_commits: row.get::<i64, _>("verified") as u64,
            total_data_coins_earned: row.get::<i64, _>("coins") as u64,
        })
    }

    async fn list_commits(&self, id: &str) -> Result<Vec<Commit>> {
        let rows = sqlx::query(
            r#"
            SELECT sha, message, author, author_email, date, additions, deletions,
                   files_changed, status, verified_at, verified_by, data_coins_earned,
                   verification_notes
            FROM commits
            WHERE repository_id = ?
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list commits")?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.get("status");
                Ok(Commit {
                    sha: row.get("sha"),
                    message: row.get("message"),
                    author: row.get("author"),
                    author_email: row.get("author_email"),
                    date: row.get("date"),
                    additions: row.get::<i64, _>("additions") as u64,
                    deletions: row.get::<i64, _>("deletions") as u64,
                    files_changed: row.get::<i64, _>("files_changed") as u64,
                    status: status.parse::<CommitStatus>()?,
                    verified_at: row.get("verified_at"),
                    verified_by: row.get("verified_by"),
                    data_coins_earned: row.get::<i64, _>("data_coins_earned") as u64,
                    verification_notes: row.get("verification_notes"),
                })
            })
            .collect()
    }

    fn row_to_repository(row: sqlx::sqlite::SqliteRow) -> Result<Repository> {
        let address: String = row.get("user_address");
        let status: String = row.get("status");

        Ok(Repository {
            id: row.get("id"),
            details: NewRepository {
                user_address: parse_address_column(&address)?,
                user_name: row.get("user_name"),
                user_email: row.get("user_email"),
                github_username: row.get("github_username"),
                repo_url: row.get("repo_url"),
                repo_name: row.get("repo_name"),
                repo_owner: row.get("repo_owner"),
                description: row.get("description"),
                language: row.get("language"),
                stars: row.get::<i64, _>("stars") as u64,
                forks: row.get::<i64, _>("forks") as u64,
                is_private: row.get("is_private"),
            },
            status: status.parse::<RepositoryStatus>()?,
            submitted_at: row.get("submitted_at"),
            reviewed_at: row.get("reviewed_at"),
            reviewed_by: row.get("reviewed_by"),
            data_coins_earned: row.get::<i64, _>("data_coins_earned") as u64,
            total_commits: row.get::<i64, _>("total_commits") as u64,
            verified_commits: row.get::<i64, _>("verified_commits") as u64,
            commits: Vec::new(),
        })
    }
}

async fn ensure_repository_exists(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<(), StorageError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM repositories WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match exists {
        Some(_) => Ok(()),
        None => Err(StorageError::NotFound("Repository")),
    }
}

/// New commits start pending with no reward.
async fn insert_commits(conn: &mut SqliteConnection, id: &str, commits: &[Commit]) -> Result<()> {
    let next_position: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM commits WHERE repository_id = ?",
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to read commit position")?;

    for (offset, commit) in commits.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO commits (
                repository_id, sha, position, message, author, author_email, date,
                additions, deletions, files_changed, status, data_coins_earned
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(repository_id, sha) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(&commit.sha)
        .bind(next_position + offset as i64)
        .bind(&commit.message)
        .bind(&commit.author)
        .bind(&commit.author_email)
        .bind(&commit.date)
        .bind(commit.additions as i64)
        .bind(commit.deletions as i64)
        .bind(commit.files_changed as i64)
        .bind(CommitStatus::Pending.as_str())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to insert commit {}", commit.sha))?;
    }

    Ok(())
}

/// Recompute commit counters and the DataCoin sum from the commit rows.
async fn refresh_aggregates(conn: &mut SqliteConnection, id: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE repositories
        SET total_commits = (
                SELECT COUNT(*) FROM commits WHERE repository_id = ?1
            ),
            verified_commits = (
                SELECT COUNT(*) FROM commits WHERE repository_id = ?1 AND status = 'verified'
            ),
            data_coins_earned = (
                SELECT COALESCE(SUM(data_coins_earned), 0) FROM commits WHERE repository_id = ?1
            )
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await
    .context("Failed to refresh repository aggregates")?;

    Ok(())
}
