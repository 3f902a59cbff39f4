//! Dashboard summaries across jobs
//!
//! Two views: a per-date series over a window of days, and a single snapshot
//! of every job's latest successful build. Percentages are summed unrounded
//! and only the averages are rounded, half to even, to one decimal.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::coverage::{CoverageRecord, Metric};
use crate::history::{builds_from, BuildCursor, JobView};

/// Round to `scale` decimals, ties to even, on the exact binary value
pub fn round_half_even(value: f64, scale: usize) -> f64 {
    // float formatting rounds the exact value with ties to even
    format!("{:.*}", scale, value).parse().unwrap_or(value)
}

/// The four percentages one job contributes to a summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobCoverage {
    pub job: String,
    pub statement: f64,
    pub branch: f64,
    #[serde(rename = "loop")]
    pub loops: f64,
    pub condition: f64,
}

impl JobCoverage {
    /// Percentages of a build's coverage, zero for anything missing
    pub fn from_record(job: &str, record: Option<&CoverageRecord>) -> Self {
        let value = |metric: Metric| record.map(|r| r.snapshot.percentage_float(metric)).unwrap_or(0.0);
        Self {
            job: job.to_string(),
            statement: value(Metric::Statement),
            branch: value(Metric::Branch),
            loops: value(Metric::Loop),
            condition: value(Metric::Condition),
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Statement => self.statement,
            Metric::Branch => self.branch,
            Metric::Loop => self.loops,
            Metric::Condition => self.condition,
        }
    }

    pub fn rounded(self) -> Self {
        Self {
            statement: round_half_even(self.statement, 1),
            branch: round_half_even(self.branch, 1),
            loops: round_half_even(self.loops, 1),
            condition: round_half_even(self.condition, 1),
            ..self
        }
    }
}

/// Running sums over the jobs folded into it
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageSummary {
    pub statement: f64,
    pub branch: f64,
    #[serde(rename = "loop")]
    pub loops: f64,
    pub condition: f64,
    pub results: Vec<JobCoverage>,
    #[serde(skip)]
    contributors: HashSet<String>,
}

impl CoverageSummary {
    pub fn add(&mut self, coverage: JobCoverage) {
        self.statement += coverage.statement;
        self.branch += coverage.branch;
        self.loops += coverage.loops;
        self.condition += coverage.condition;
        self.contributors.insert(coverage.job.clone());
        self.results.push(coverage);
    }

    pub fn contains_job(&self, job: &str) -> bool {
        self.contributors.contains(job)
    }

    pub fn count(&self) -> usize {
        self.results.len()
    }

    pub fn sum(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Statement => self.statement,
            Metric::Branch => self.branch,
            Metric::Loop => self.loops,
            Metric::Condition => self.condition,
        }
    }

    /// Mean over contributions, rounded to one decimal; 0 when empty
    pub fn average(&self, metric: Metric) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        round_half_even(self.sum(metric) / self.results.len() as f64, 1)
    }
}

/// Averages of one summary, as charted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub statement: f64,
    pub branch: f64,
    #[serde(rename = "loop")]
    pub loops: f64,
    pub condition: f64,
    pub job_count: usize,
}

impl ChartPoint {
    pub fn new(date: NaiveDate, summary: &CoverageSummary) -> Self {
        Self {
            date,
            statement: summary.average(Metric::Statement),
            branch: summary.average(Metric::Branch),
            loops: summary.average(Metric::Loop),
            condition: summary.average(Metric::Condition),
            job_count: summary.count(),
        }
    }
}

/// Date of the newest build across all jobs
pub fn last_date<J: JobView>(jobs: &[J]) -> Option<NaiveDate> {
    jobs.iter()
        .filter_map(|job| job.latest_build())
        .map(|build| build.timestamp().date_naive())
        .max()
}

fn summarize<C: BuildCursor>(
    summaries: &mut BTreeMap<NaiveDate, CoverageSummary>,
    job: &str,
    run_date: NaiveDate,
    build: &C,
) {
    let summary = summaries.entry(run_date).or_default();

    // the newest build of a job on a given day is the one that counts
    if summary.contains_job(job) {
        return;
    }

    let record = build.coverage();
    summary.add(JobCoverage::from_record(job, record.as_deref()));
}

/// Per-date summaries for the `days_back` days up to the newest build.
///
/// `None` when no job has any build. Builds on or before the first date of
/// the window are not visited.
pub fn chart_data_within_range<J: JobView>(
    jobs: &[J],
    days_back: u32,
) -> Option<BTreeMap<NaiveDate, CoverageSummary>> {
    let last = last_date(jobs)?;
    let first = last
        .checked_sub_days(Days::new(u64::from(days_back)))
        .unwrap_or(NaiveDate::MIN);

    let mut summaries = BTreeMap::new();

    for job in jobs {
        for build in builds_from(job.latest_build()) {
            let run_date = build.timestamp().date_naive();
            if run_date <= first {
                break;
            }
            summarize(&mut summaries, job.name(), run_date, &build);
        }
    }

    Some(summaries)
}

/// Chart points in ascending date order
pub fn chart_points(summaries: &BTreeMap<NaiveDate, CoverageSummary>) -> Vec<ChartPoint> {
    summaries
        .iter()
        .map(|(date, summary)| ChartPoint::new(*date, summary))
        .collect()
}

/// Current coverage of every job: its latest successful build, or zeros
pub fn result_summary<J: JobView>(jobs: &[J]) -> CoverageSummary {
    let mut summary = CoverageSummary::default();

    for job in jobs {
        let record = job
            .latest_successful_build()
            .and_then(|build| build.coverage());
        summary.add(JobCoverage::from_record(job.name(), record.as_deref()).rounded());
    }

    summary
}
