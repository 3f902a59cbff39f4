//! Coverage and artifact queries

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{parse_timestamp, Database};
use crate::coverage::{CoverageRecord, CoverageSnapshot, HealthReporting, Metric, Ratio, Thresholds};
use crate::history::{BuildEntry, JobHistory};

/// Stored copy of a report file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: i64,
    pub job: String,
    pub number: u64,
    pub file_path: String,
    pub sha256: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

const COVERAGE_COLUMNS: &str = "c.recorded_at, c.statement_covered, c.statement_total, c.branch_covered, c.branch_total,
     c.loop_covered, c.loop_total, c.condition_covered, c.condition_total,
     c.min_statement, c.max_statement, c.min_branch, c.max_branch,
     c.min_loop, c.max_loop, c.min_condition, c.max_condition";

/// Raw coverage columns, starting at `offset`
struct CoverageRow {
    present: bool,
    ratios: [(Option<f64>, Option<f64>); 4],
    thresholds: [Option<i32>; 8],
}

impl CoverageRow {
    fn read(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        let present = row.get::<_, Option<String>>(offset)?.is_some();
        let mut ratios = [(None, None); 4];
        for (i, slot) in ratios.iter_mut().enumerate() {
            *slot = (row.get(offset + 1 + 2 * i)?, row.get(offset + 2 + 2 * i)?);
        }
        let mut thresholds = [None; 8];
        for (i, slot) in thresholds.iter_mut().enumerate() {
            *slot = row.get(offset + 9 + i)?;
        }
        Ok(Self {
            present,
            ratios,
            thresholds,
        })
    }

    /// `None` when the build has no coverage row (LEFT JOIN miss)
    fn into_record(self, job: &str, number: u64) -> Option<CoverageRecord> {
        if !self.present {
            return None;
        }

        let slots = self.ratios.map(|pair| match pair {
            (Some(n), Some(d)) => Some(Ratio::new(n, d)),
            _ => None,
        });

        let health = match self.thresholds {
            [Some(a), Some(b), Some(c), Some(d), Some(e), Some(f), Some(g), Some(h)] => {
                HealthReporting::Enabled(Thresholds::new(a, b, c, d, e, f, g, h))
            }
            _ => HealthReporting::Disabled,
        };

        Some(CoverageRecord::new(job, number, CoverageSnapshot::from_slots(slots), health))
    }
}

impl Database {
    // === Coverage Results ===

    /// Store (or replace) the coverage of a build, with the thresholds in force
    pub fn insert_coverage(
        &self,
        job: &str,
        number: u64,
        snapshot: &CoverageSnapshot,
        health: &HealthReporting,
    ) -> Result<()> {
        let ratio = |metric: Metric| snapshot.get(metric);
        let covered = |metric: Metric| ratio(metric).map(|r| r.numerator());
        let total = |metric: Metric| ratio(metric).map(|r| r.denominator());
        let thresholds = health.thresholds();
        let bound = |f: fn(&Thresholds) -> i32| thresholds.map(f);

        self.conn.execute(
            "INSERT OR REPLACE INTO coverage_results (
                job, number,
                statement_covered, statement_total, branch_covered, branch_total,
                loop_covered, loop_total, condition_covered, condition_total,
                min_statement, max_statement, min_branch, max_branch,
                min_loop, max_loop, min_condition, max_condition,
                recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                job,
                number as i64,
                covered(Metric::Statement),
                total(Metric::Statement),
                covered(Metric::Branch),
                total(Metric::Branch),
                covered(Metric::Loop),
                total(Metric::Loop),
                covered(Metric::Condition),
                total(Metric::Condition),
                bound(|t| t.min_statement),
                bound(|t| t.max_statement),
                bound(|t| t.min_branch),
                bound(|t| t.max_branch),
                bound(|t| t.min_loop),
                bound(|t| t.max_loop),
                bound(|t| t.min_condition),
                bound(|t| t.max_condition),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Coverage recorded for one build
    pub fn get_coverage(&self, job: &str, number: u64) -> Result<Option<CoverageRecord>> {
        let sql = format!(
            "SELECT {} FROM coverage_results c WHERE c.job = ?1 AND c.number = ?2",
            COVERAGE_COLUMNS
        );

        let row = self
            .conn
            .query_row(&sql, params![job, number as i64], |row| CoverageRow::read(row, 0))
            .optional()?;

        Ok(row.and_then(|r| r.into_record(job, number)))
    }

    /// Full history of a job, oldest first, with coverage attached
    pub fn load_job(&self, job: &str) -> Result<JobHistory> {
        let sql = format!(
            "SELECT b.number, b.outcome, b.started_at, {}
             FROM builds b
             LEFT JOIN coverage_results c ON c.job = b.job AND c.number = b.number
             WHERE b.job = ?1
             ORDER BY b.number",
            COVERAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt.query_map(params![job], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                CoverageRow::read(row, 3)?,
            ))
        })?;

        let mut builds = Vec::new();
        for row in rows {
            let (number, outcome, started_at, coverage) = row?;
            let number = u64::try_from(number)?;
            builds.push(BuildEntry {
                number,
                timestamp: parse_timestamp(&started_at)?,
                outcome: outcome.parse()?,
                coverage: coverage.into_record(job, number).map(Arc::new),
            });
        }

        Ok(JobHistory::new(job, builds))
    }

    /// Every stored job's history
    pub fn load_jobs(&self) -> Result<Vec<JobHistory>> {
        self.job_names()?
            .iter()
            .map(|name| self.load_job(name))
            .collect()
    }

    // === Artifacts ===

    pub fn insert_artifact(
        &self,
        job: &str,
        number: u64,
        file_path: &str,
        sha256: &str,
        size_bytes: i64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO artifacts (job, number, file_path, sha256, size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job,
                number as i64,
                file_path,
                sha256,
                size_bytes,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_artifacts(&self, job: &str, number: u64) -> Result<Vec<Artifact>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job, number, file_path, sha256, size_bytes, created_at
             FROM artifacts WHERE job = ?1 AND number = ?2 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![job, number as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut artifacts = Vec::new();
        for row in rows {
            let (id, job, number, file_path, sha256, size_bytes, created_at) = row?;
            artifacts.push(Artifact {
                id,
                job,
                number: u64::try_from(number)?,
                file_path,
                sha256,
                size_bytes,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(artifacts)
    }

    /// Remove a build's artifact rows; returns how many were removed
    pub fn delete_artifacts(&self, job: &str, number: u64) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM artifacts WHERE job = ?1 AND number = ?2",
            params![job, number as i64],
        )?;
        Ok(deleted)
    }

    /// Drop stored coverage for a build, keeping the build itself
    pub fn delete_coverage(&self, job: &str, number: u64) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM coverage_results WHERE job = ?1 AND number = ?2",
            params![job, number as i64],
        )?;
        Ok(deleted > 0)
    }
}
