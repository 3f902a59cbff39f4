//! Database module for coverwatch
//!
//! SQLite storage for build history, coverage results and stored reports.

mod queries;
mod schema;

pub use queries::*;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::history::BuildOutcome;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    // === Builds ===

    /// Insert a build, or update its outcome and start time if it exists
    pub fn upsert_build(
        &self,
        job: &str,
        number: u64,
        outcome: BuildOutcome,
        started_at: DateTime<Utc>,
    ) -> Result<Build> {
        self.conn.execute(
            "INSERT INTO builds (job, number, outcome, started_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(job, number) DO UPDATE SET outcome = excluded.outcome, started_at = excluded.started_at",
            params![job, number as i64, outcome.as_str(), started_at.to_rfc3339()],
        )?;

        Ok(Build {
            job: job.to_string(),
            number,
            outcome,
            started_at,
        })
    }

    pub fn set_build_outcome(&self, job: &str, number: u64, outcome: BuildOutcome) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE builds SET outcome = ?1 WHERE job = ?2 AND number = ?3",
            params![outcome.as_str(), job, number as i64],
        )?;
        if updated == 0 {
            anyhow::bail!("Build {} #{} not found", job, number);
        }
        Ok(())
    }

    pub fn get_build(&self, job: &str, number: u64) -> Result<Option<Build>> {
        let row = self
            .conn
            .query_row(
                "SELECT job, number, outcome, started_at FROM builds WHERE job = ?1 AND number = ?2",
                params![job, number as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(job, number, outcome, started_at)| Build::from_row(job, number, &outcome, &started_at))
            .transpose()
    }

    /// Names of every job with at least one build, sorted
    pub fn job_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT job FROM builds ORDER BY job")?;

        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a job's history; returns the number of rows removed
    pub fn clear_job(&self, job: &str) -> Result<usize> {
        let mut total = 0;
        total += self.conn.execute("DELETE FROM artifacts WHERE job = ?1", params![job])?;
        total += self.conn.execute("DELETE FROM coverage_results WHERE job = ?1", params![job])?;
        total += self.conn.execute("DELETE FROM builds WHERE job = ?1", params![job])?;
        Ok(total)
    }
}

// === Data Types ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub job: String,
    pub number: u64,
    pub outcome: BuildOutcome,
    pub started_at: DateTime<Utc>,
}

impl Build {
    fn from_row(job: String, number: i64, outcome: &str, started_at: &str) -> Result<Self> {
        Ok(Self {
            job,
            number: u64::try_from(number)?,
            outcome: outcome.parse()?,
            started_at: parse_timestamp(started_at)?,
        })
    }
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp in database: {}", value))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("nested").join("coverwatch.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_upsert_and_get_build() {
        let (_dir, db) = temp_db();
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        db.upsert_build("api", 1, BuildOutcome::Success, at).unwrap();
        db.upsert_build("api", 1, BuildOutcome::Unstable, at).unwrap();

        let build = db.get_build("api", 1).unwrap().unwrap();
        assert_eq!(build.outcome, BuildOutcome::Unstable);
        assert_eq!(build.started_at, at);
        assert!(db.get_build("api", 2).unwrap().is_none());
    }

    #[test]
    fn test_set_build_outcome() {
        let (_dir, db) = temp_db();
        db.upsert_build("api", 3, BuildOutcome::Success, Utc::now()).unwrap();

        db.set_build_outcome("api", 3, BuildOutcome::Failure).unwrap();
        assert_eq!(db.get_build("api", 3).unwrap().unwrap().outcome, BuildOutcome::Failure);
        assert!(db.set_build_outcome("api", 4, BuildOutcome::Failure).is_err());
    }

    #[test]
    fn test_job_names_and_clear() {
        let (_dir, db) = temp_db();
        db.upsert_build("web", 1, BuildOutcome::Success, Utc::now()).unwrap();
        db.upsert_build("api", 1, BuildOutcome::Success, Utc::now()).unwrap();
        db.upsert_build("api", 2, BuildOutcome::Success, Utc::now()).unwrap();

        assert_eq!(db.job_names().unwrap(), vec!["api", "web"]);
        assert_eq!(db.clear_job("api").unwrap(), 2);
        assert_eq!(db.job_names().unwrap(), vec!["web"]);
    }
}
