//! Coverage comparison between a build and its previous result

use colored::Colorize;
use serde::Serialize;

use super::{CoverageSnapshot, Metric};

/// Drop in percentage points beyond which a metric counts as degraded
pub const DEGRADATION_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTrend {
    pub metric: Metric,
    pub previous: f64,
    pub current: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageTrend {
    pub metrics: Vec<MetricTrend>,
    pub improved: bool,
    pub degraded: bool,
}

/// Compare coverage between two builds. Metrics missing on either side are left out.
pub fn compare_coverage(previous: &CoverageSnapshot, current: &CoverageSnapshot) -> CoverageTrend {
    let metrics: Vec<MetricTrend> = Metric::ALL
        .iter()
        .filter_map(|&metric| {
            let old = previous.get(metric)?.percentage_float();
            let new = current.get(metric)?.percentage_float();
            Some(MetricTrend {
                metric,
                previous: old,
                current: new,
                delta: new - old,
            })
        })
        .collect();

    CoverageTrend {
        improved: metrics.iter().any(|m| m.delta > 0.0),
        degraded: metrics.iter().any(|m| m.delta < -DEGRADATION_TOLERANCE),
        metrics,
    }
}

impl CoverageTrend {
    pub fn print_summary(&self) {
        println!("Coverage trend:");

        for trend in &self.metrics {
            let indicator = if trend.delta > 0.0 {
                "↑".green()
            } else if trend.delta < 0.0 {
                "↓".red()
            } else {
                "→".dimmed()
            };

            let delta_str = if trend.delta > 0.0 {
                format!("+{:.1}%", trend.delta).green()
            } else if trend.delta < 0.0 {
                format!("{:.1}%", trend.delta).red()
            } else {
                "0%".dimmed()
            };

            println!(
                "  {} {}: {:.1}% → {:.1}% ({})",
                indicator, trend.metric, trend.previous, trend.current, delta_str
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::Ratio;

    #[test]
    fn test_coverage_comparison() {
        let old = CoverageSnapshot::from_slots([
            Some(Ratio::new(70.0, 100.0)),
            Some(Ratio::new(50.0, 100.0)),
            None,
            Some(Ratio::new(1.0, 2.0)),
        ]);
        let new = CoverageSnapshot::from_slots([
            Some(Ratio::new(75.0, 100.0)),
            Some(Ratio::new(55.0, 100.0)),
            Some(Ratio::new(9.0, 10.0)),
            None,
        ]);

        let trend = compare_coverage(&old, &new);
        assert!(trend.improved);
        assert!(!trend.degraded);
        assert_eq!(trend.metrics.len(), 2);
        assert_eq!(trend.metrics[0].delta, 5.0);
    }

    #[test]
    fn test_small_drop_is_not_degradation() {
        let old = CoverageSnapshot::from_slots([Some(Ratio::new(800.0, 1000.0)), None, None, None]);
        let slight = CoverageSnapshot::from_slots([Some(Ratio::new(795.0, 1000.0)), None, None, None]);
        let large = CoverageSnapshot::from_slots([Some(Ratio::new(700.0, 1000.0)), None, None, None]);

        assert!(!compare_coverage(&old, &slight).degraded);
        assert!(compare_coverage(&old, &large).degraded);
    }
}
