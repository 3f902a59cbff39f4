//! Per-build coverage result and its derived detailed report

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::{evaluate_health, CoverageSnapshot, HealthReporting, HealthScore, Metric, Ratio};

/// Coverage attached to one build: the parsed snapshot plus the thresholds
/// in force when it was recorded.
#[derive(Debug)]
pub struct CoverageRecord {
    pub job: String,
    pub build: u64,
    pub snapshot: CoverageSnapshot,
    pub health: HealthReporting,
    report: Mutex<Weak<CoverageReport>>,
}

impl Clone for CoverageRecord {
    fn clone(&self) -> Self {
        Self::new(&self.job, self.build, self.snapshot, self.health)
    }
}

impl CoverageRecord {
    pub fn new(job: &str, build: u64, snapshot: CoverageSnapshot, health: HealthReporting) -> Self {
        Self {
            job: job.to_string(),
            build,
            snapshot,
            health,
            report: Mutex::new(Weak::new()),
        }
    }

    pub fn health_score(&self) -> Option<HealthScore> {
        evaluate_health(&self.health, &self.snapshot)
    }

    /// Detailed report for this build. While any caller still holds the
    /// returned report, every other caller gets the same instance.
    pub fn report(&self) -> Arc<CoverageReport> {
        let mut cached = self.report.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(report) = cached.upgrade() {
            return report;
        }

        let report = Arc::new(CoverageReport::from_record(self));
        *cached = Arc::downgrade(&report);
        report
    }
}

/// Coverage of one metric in a detailed report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCoverage {
    pub metric: Metric,
    pub ratio: Option<Ratio>,
    pub percentage: Option<f64>,
}

/// Presentation view of a build's coverage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub name: String,
    pub job: String,
    pub build: u64,
    pub metrics: Vec<MetricCoverage>,
    pub health: Option<HealthScore>,
}

impl CoverageReport {
    fn from_record(record: &CoverageRecord) -> Self {
        let metrics = Metric::ALL
            .iter()
            .map(|&metric| {
                let ratio = record.snapshot.get(metric);
                MetricCoverage {
                    metric,
                    ratio,
                    percentage: ratio.map(|r| r.percentage_float()),
                }
            })
            .collect();

        Self {
            name: "Coverage".to_string(),
            job: record.job.clone(),
            build: record.build,
            metrics,
            health: record.health_score(),
        }
    }
}
