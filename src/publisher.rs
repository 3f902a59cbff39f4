//! Recording a build's coverage
//!
//! Finds report files in a workspace, keeps copies with the build, parses
//! them and stores the result. The build outcome is only ever downgraded to
//! failure here, and only when no usable report was produced.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::coverage::{
    compare_coverage, parse_report_files, CoverageRecord, CoverageTrend, HealthReporting, HealthScore,
};
use crate::db::Database;
use crate::error::ReportError;
use crate::history::{previous_result, BuildOutcome};

/// Searched for when no includes are configured
pub const DEFAULT_REPORT_PATTERN: &str = "**/report.html";

/// Searched for inside folders named by a legacy includes list
pub const LEGACY_DIR_PATTERNS: &[&str] = &["**/coverage*.xml", "**/report.html"];

fn glob_files(base: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        let Some(base) = base.to_str() else {
            warn!(path = %base.display(), "workspace path is not valid UTF-8");
            return Vec::new();
        };
        format!("{}/{}", glob::Pattern::escape(base), pattern)
    };

    match glob::glob(&full) {
        Ok(paths) => paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect(),
        Err(e) => {
            debug!(pattern = %full, error = %e, "not a glob pattern");
            Vec::new()
        }
    }
}

/// Locate report files in a workspace.
///
/// `includes` is tried as a glob first. If that finds nothing it is read as
/// a list of files and folders separated by `;`, `:` or `,`.
pub fn locate_reports(workspace: &Path, includes: &str) -> Vec<PathBuf> {
    let includes = includes.trim();
    if includes.is_empty() {
        return glob_files(workspace, DEFAULT_REPORT_PATTERN);
    }

    let found = glob_files(workspace, includes);
    if !found.is_empty() {
        return found;
    }

    let mut files = Vec::new();
    for part in includes
        .split(|c| matches!(c, ';' | ':' | ','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let src = workspace.join(part);
        if src.is_dir() {
            for pattern in LEGACY_DIR_PATTERNS {
                files.extend(glob_files(&src, pattern));
            }
        } else if src.is_file() {
            files.push(src);
        }
    }
    files
}

/// Job names become folder names under the artifacts directory
pub fn validate_job_name(job: &str) -> Result<()> {
    if job.trim().is_empty() {
        anyhow::bail!("Job name must not be empty");
    }
    if job == "." || job == ".." || job.contains(['/', '\\']) {
        anyhow::bail!("Invalid job name '{}': path separators and '..' are not allowed", job);
    }
    Ok(())
}

fn resolved(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Report copy kept with a build
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

fn stored_name(index: usize) -> String {
    if index == 0 {
        "report.html".to_string()
    } else {
        format!("report{}.html", index)
    }
}

/// Copy reports into `folder` as `report.html`, `report1.html`, ...
pub fn save_reports(folder: &Path, files: &[PathBuf]) -> Result<Vec<StoredReport>> {
    fs::create_dir_all(folder)
        .with_context(|| format!("Failed to create report folder: {}", folder.display()))?;

    let mut stored = Vec::with_capacity(files.len());
    for (index, src) in files.iter().enumerate() {
        let dst = folder.join(stored_name(index));
        let content = fs::read(src).with_context(|| format!("Failed to read report: {}", src.display()))?;
        fs::write(&dst, &content).with_context(|| format!("Failed to store report: {}", dst.display()))?;

        stored.push(StoredReport {
            path: dst,
            sha256: hex::encode(Sha256::digest(&content)),
            size_bytes: content.len() as u64,
        });
    }
    Ok(stored)
}

/// A build to record
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub job: String,
    pub number: u64,
    pub outcome: BuildOutcome,
    pub started_at: DateTime<Utc>,
    pub workspace: PathBuf,
    /// Report files given explicitly; when empty the workspace is searched
    pub reports: Vec<PathBuf>,
}

/// What recording a build produced
#[derive(Debug)]
pub struct Published {
    pub outcome: BuildOutcome,
    pub reports: Vec<StoredReport>,
    pub record: Option<CoverageRecord>,
    pub health: Option<HealthScore>,
    pub trend: Option<CoverageTrend>,
}

impl Published {
    fn without_coverage(outcome: BuildOutcome, reports: Vec<StoredReport>) -> Self {
        Self {
            outcome,
            reports,
            record: None,
            health: None,
            trend: None,
        }
    }
}

pub struct Publisher<'a> {
    db: &'a Database,
    artifacts_dir: PathBuf,
    includes: String,
    health: HealthReporting,
}

impl<'a> Publisher<'a> {
    pub fn new(db: &'a Database, artifacts_dir: &Path, includes: &str, health: HealthReporting) -> Self {
        Self {
            db,
            artifacts_dir: artifacts_dir.to_path_buf(),
            includes: includes.to_string(),
            health,
        }
    }

    /// Folder holding the stored reports of one build
    pub fn build_folder(&self, job: &str, number: u64) -> PathBuf {
        self.artifacts_dir.join(job).join(number.to_string())
    }

    pub fn publish(&self, request: &PublishRequest) -> Result<Published> {
        let job = request.job.as_str();
        let number = request.number;
        validate_job_name(job)?;
        self.db
            .upsert_build(job, number, request.outcome, request.started_at)?;
        self.clear_previous_attempt(job, number)?;

        let reports = if request.reports.is_empty() {
            if self.includes.trim().is_empty() {
                println!(
                    "{} looking for coverage reports in the entire workspace: {}",
                    "coverwatch:".cyan(),
                    request.workspace.display()
                );
            } else {
                println!(
                    "{} looking for coverage reports in the provided path: {}",
                    "coverwatch:".cyan(),
                    self.includes
                );
            }
            // stored copies of earlier builds may live inside the workspace
            let stored_root = resolved(&self.artifacts_dir);
            locate_reports(&request.workspace, &self.includes)
                .into_iter()
                .filter(|p| !resolved(p).starts_with(&stored_root))
                .collect()
        } else {
            request.reports.clone()
        };

        if reports.is_empty() {
            if request.outcome.is_worse_than(BuildOutcome::Unstable) {
                info!(job, number, outcome = %request.outcome, "no reports on an already broken build");
                return Ok(Published::without_coverage(request.outcome, Vec::new()));
            }

            println!(
                "{} no coverage files found in workspace. Was any report generated?",
                "coverwatch:".cyan()
            );
            return self.fail(job, number, Vec::new());
        }

        println!("{} found {} report files:", "coverwatch:".cyan(), reports.len());
        for report in &reports {
            println!("          {}", report.display().to_string().dimmed());
        }

        let folder = self.build_folder(job, number);
        let stored = save_reports(&folder, &reports)?;
        for report in &stored {
            self.db.insert_artifact(
                job,
                number,
                &report.path.to_string_lossy(),
                &report.sha256,
                report.size_bytes as i64,
            )?;
        }
        println!(
            "{} stored {} report files in the build folder: {}",
            "coverwatch:".cyan(),
            stored.len(),
            folder.display()
        );

        let paths: Vec<&Path> = stored.iter().map(|r| r.path.as_path()).collect();
        let snapshot = match parse_report_files(paths.as_slice()) {
            Ok(snapshot) => snapshot,
            Err(ReportError::NoDataFound { inputs }) => {
                warn!(job, number, inputs, "no coverage ratios in reports");
                println!(
                    "{} Could not parse coverage results. Setting build to {}.",
                    "coverwatch:".cyan(),
                    "failure".red()
                );
                return self.fail(job, number, stored);
            }
            Err(e) => return Err(e.into()),
        };

        self.db.insert_coverage(job, number, &snapshot, &self.health)?;
        let record = CoverageRecord::new(job, number, snapshot, self.health);

        let health = record.health_score();
        match &health {
            Some(score) => println!(
                "{} {} (health {})",
                "coverwatch:".cyan(),
                score.description(),
                score.score
            ),
            None => println!("{} health reporting disabled", "coverwatch:".cyan()),
        }

        let trend = self
            .db
            .load_job(job)?
            .build(number)
            .and_then(|build| previous_result(&build))
            .map(|previous| compare_coverage(&previous.snapshot, &record.snapshot));

        Ok(Published {
            outcome: request.outcome,
            reports: stored,
            record: Some(record),
            health,
            trend,
        })
    }

    /// Forget what an earlier recording of the same build stored
    fn clear_previous_attempt(&self, job: &str, number: u64) -> Result<()> {
        let artifacts = self.db.delete_artifacts(job, number)?;
        let coverage = self.db.delete_coverage(job, number)?;
        if artifacts > 0 || coverage {
            debug!(job, number, artifacts, coverage, "cleared earlier recording");
        }

        let folder = self.build_folder(job, number);
        if folder.is_dir() {
            fs::remove_dir_all(&folder)
                .with_context(|| format!("Failed to clear report folder: {}", folder.display()))?;
        }
        Ok(())
    }

    fn fail(&self, job: &str, number: u64, reports: Vec<StoredReport>) -> Result<Published> {
        self.db.set_build_outcome(job, number, BuildOutcome::Failure)?;
        Ok(Published::without_coverage(BuildOutcome::Failure, reports))
    }
}
