//! Course catalogue storage operations.

use super::{unix_now, Course, Storage};
use anyhow::{Context, Result};
use poc_core::CourseDifficulty;
use sqlx::Row;

const COURSE_COLUMNS: &str = r#"
    id, title, description, difficulty, stake_amount, modules_json,
    assignments_json, allow_repo_submission, active, published,
    created_at, updated_at
"#;

impl Storage {
    /// Insert or replace a course. Returns the stored course.
    ///
    /// `created_at` is preserved across updates.
    pub async fn upsert_course(&self, course: &Course) -> Result<Course> {
        anyhow::ensure!(!course.modules.is_empty(), "Course must have at least one module");
        poc_core::rewards::parse_token_amount(&course.stake_amount)
            .with_context(|| format!("Invalid stake amount for course {}", course.id))?;

        let now = unix_now();
        let modules_json = serde_json::to_string(&course.modules)?;
        let assignments_json = serde_json::to_string(&course.assignments)?;

        sqlx::query(
            r#"
            INSERT INTO courses (
                id, title, description, difficulty, stake_amount, modules_json,
                assignments_json, allow_repo_submission, active, published,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                difficulty = excluded.difficulty,
                stake_amount = excluded.stake_amount,
                modules_json = excluded.modules_json,
                assignments_json = excluded.assignments_json,
                allow_repo_submission = excluded.allow_repo_submission,
                active = excluded.active,
                published = excluded.published,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(course.id as i64)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.difficulty.as_str())
        .bind(&course.stake_amount)
        .bind(modules_json)
        .bind(assignments_json)
        .bind(course.allow_repo_submission)
        .bind(course.active)
        .bind(course.published)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert course {}", course.id))?;

        self.get_course(course.id)
            .await?
            .context("Course missing after upsert")
    }

    /// Get a course by id.
    pub async fn get_course(&self, course_id: u64) -> Result<Option<Course>> {
        let sql = format!("SELECT {} FROM courses WHERE id = ?", COURSE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(course_id as i64)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch course")?;

        row.map(Self::row_to_course).transpose()
    }

    /// List courses ordered by id, optionally only active and published ones.
    pub async fn list_courses(&self, only_active: bool) -> Result<Vec<Course>> {
        let filter = if only_active {
            "WHERE active = 1 AND published = 1"
        } else {
            ""
        };
        let sql = format!("SELECT {} FROM courses {} ORDER BY id", COURSE_COLUMNS, filter);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list courses")?;

        rows.into_iter().map(Self::row_to_course).collect()
    }

    /// Delete a course. Returns false if it did not exist.
    pub async fn delete_course(&self, course_id: u64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(course_id as i64)
            .execute(&self.pool)
            .await
            .context("Failed to delete course")?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_course(row: sqlx::sqlite::SqliteRow) -> Result<Course> {
        let difficulty: String = row.get("difficulty");
        let modules_json: String = row.get("modules_json");
        let assignments_json: String = row.get("assignments_json");

        Ok(Course {
            id: row.get::<i64, _>("id") as u64,
            title: row.get("title"),
            description: row.get("description"),
            difficulty: difficulty.parse::<CourseDifficulty>()?,
            stake_amount: row.get("stake_amount"),
            modules: serde_json::from_str(&modules_json).context("Invalid stored modules")?,
            assignments: serde_json::from_str(&assignments_json)
                .context("Invalid stored assignments")?,
            allow_repo_submission: row.get("allow_repo_submission"),
            active: row.get("active"),
            published: row.get("published"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
