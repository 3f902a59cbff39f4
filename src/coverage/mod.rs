//! Coverage module
//!
//! Provides:
//! - Ratios and the per-build coverage snapshot
//! - Report scanning
//! - Threshold normalization and health scoring
//! - Trend comparison between two builds

mod health;
mod parser;
mod ratio;
mod record;
mod thresholds;
mod trend;

pub use health::*;
pub use parser::*;
pub use ratio::*;
pub use record::*;
pub use thresholds::*;
pub use trend::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four coverage metrics, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Statement,
    Branch,
    Loop,
    Condition,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Statement,
        Metric::Branch,
        Metric::Loop,
        Metric::Condition,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Statement => "Statement",
            Metric::Branch => "Branch",
            Metric::Loop => "Loop",
            Metric::Condition => "Condition",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The four ratios captured for one build. Absent ratios were not in the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    pub statement: Option<Ratio>,
    pub branch: Option<Ratio>,
    #[serde(rename = "loop")]
    pub loops: Option<Ratio>,
    pub condition: Option<Ratio>,
}

impl CoverageSnapshot {
    pub fn from_slots(slots: [Option<Ratio>; 4]) -> Self {
        let [statement, branch, loops, condition] = slots;
        Self {
            statement,
            branch,
            loops,
            condition,
        }
    }

    pub fn get(&self, metric: Metric) -> Option<Ratio> {
        match metric {
            Metric::Statement => self.statement,
            Metric::Branch => self.branch,
            Metric::Loop => self.loops,
            Metric::Condition => self.condition,
        }
    }

    /// Unrounded percentage of a metric, 0 when the metric is absent
    pub fn percentage_float(&self, metric: Metric) -> f64 {
        self.get(metric).map(|r| r.percentage_float()).unwrap_or(0.0)
    }

    pub fn present_count(&self) -> usize {
        Metric::ALL.iter().filter(|m| self.get(**m).is_some()).count()
    }
}
