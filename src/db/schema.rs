//! Database schema and migrations

use anyhow::Result;
use rusqlite::Connection;

/// Current schema version (used for documentation/debugging)
#[allow(dead_code)]
const SCHEMA_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Builds and their coverage
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS builds (
            job TEXT NOT NULL,
            number INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            started_at TEXT NOT NULL,
            PRIMARY KEY (job, number)
        );

        -- A NULL numerator/denominator pair means the metric was not in the report.
        -- Thresholds are NULL when health reporting was disabled for the build.
        CREATE TABLE IF NOT EXISTS coverage_results (
            job TEXT NOT NULL,
            number INTEGER NOT NULL,
            statement_covered REAL,
            statement_total REAL,
            branch_covered REAL,
            branch_total REAL,
            loop_covered REAL,
            loop_total REAL,
            condition_covered REAL,
            condition_total REAL,
            min_statement INTEGER,
            max_statement INTEGER,
            min_branch INTEGER,
            max_branch INTEGER,
            min_loop INTEGER,
            max_loop INTEGER,
            min_condition INTEGER,
            max_condition INTEGER,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (job, number),
            FOREIGN KEY (job, number) REFERENCES builds(job, number)
        );

        CREATE INDEX IF NOT EXISTS idx_builds_started_at ON builds(started_at);

        INSERT INTO schema_migrations (version, applied_at) VALUES (1, datetime('now'));
        "#,
    )?;

    Ok(())
}

/// Stored copies of report files
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job TEXT NOT NULL,
            number INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (job, number) REFERENCES builds(job, number)
        );

        CREATE INDEX IF NOT EXISTS idx_artifacts_build ON artifacts(job, number);

        INSERT INTO schema_migrations (version, applied_at) VALUES (2, datetime('now'));
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_migrations() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"builds".to_string()));
        assert!(tables.contains(&"coverage_results".to_string()));
        assert!(tables.contains(&"artifacts".to_string()));
    }

    #[test]
    fn test_migrations_are_rerunnable() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
