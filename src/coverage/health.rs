//! Build health scoring against thresholds

use serde::Serialize;
use std::fmt;

use super::{CoverageSnapshot, HealthReporting, Metric, Ratio};

/// One message per metric plus the closing summary
pub const MAX_HEALTH_MESSAGES: usize = 5;

/// One line of a health description
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthMessage {
    BelowTarget {
        metric: Metric,
        ratio: Ratio,
        percent: i32,
    },
    Perfect,
}

impl fmt::Display for HealthMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthMessage::BelowTarget {
                metric,
                ratio,
                percent,
            } => write!(f, "{} coverage below target: {} ({}%).", metric, ratio, percent),
            HealthMessage::Perfect => f.write_str("All coverage targets met."),
        }
    }
}

/// Score in `[0, 100]` with the messages explaining it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthScore {
    pub score: i32,
    pub messages: Vec<HealthMessage>,
}

impl HealthScore {
    pub fn description(&self) -> String {
        let parts: Vec<String> = self.messages.iter().map(|m| m.to_string()).collect();
        format!("Coverage: {}", parts.join(" "))
    }
}

/// Score of a single metric: 100 at or above `max`, 0 at or below `min`,
/// linear in between (rounded down).
pub fn metric_score(percent: i32, min: i32, max: i32) -> i32 {
    if percent >= max {
        return 100;
    }
    if percent <= min {
        return 0;
    }
    100 * (percent - min) / (max - min)
}

/// Evaluate build health. `None` means health reporting is switched off,
/// which is not the same as a score of 0.
pub fn evaluate_health(reporting: &HealthReporting, snapshot: &CoverageSnapshot) -> Option<HealthScore> {
    let thresholds = reporting.thresholds()?.normalized();

    let mut score = 100;
    let mut messages = Vec::with_capacity(MAX_HEALTH_MESSAGES);

    for metric in Metric::ALL {
        let (min, max) = thresholds.range(metric);
        let Some(ratio) = snapshot.get(metric) else {
            continue;
        };
        if max <= 0 {
            continue;
        }

        let percent = ratio.percentage();
        if percent < max {
            messages.push(HealthMessage::BelowTarget {
                metric,
                ratio,
                percent,
            });
        }
        score = score.min(metric_score(percent, min, max));
    }

    if messages.is_empty() {
        messages.push(HealthMessage::Perfect);
    }

    Some(HealthScore { score, messages })
}
