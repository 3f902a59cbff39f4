//! Health report thresholds

use serde::{Deserialize, Serialize};

use super::Metric;

/// Min/max percentage bounds for each metric.
///
/// A `max` of 0 disables the metric. Values may arrive in any range from
/// configuration, so scoring always goes through [`Thresholds::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub min_statement: i32,
    pub max_statement: i32,
    pub min_branch: i32,
    pub max_branch: i32,
    pub min_loop: i32,
    pub max_loop: i32,
    pub min_condition: i32,
    pub max_condition: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_statement: 0,
            max_statement: 90,
            min_branch: 0,
            max_branch: 80,
            min_loop: 0,
            max_loop: 50,
            min_condition: 0,
            max_condition: 50,
        }
    }
}

fn apply_range(min: i32, value: i32, max: i32) -> i32 {
    if value < min {
        return min;
    }
    if value > max {
        return max;
    }
    value
}

impl Thresholds {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        min_statement: i32,
        max_statement: i32,
        min_branch: i32,
        max_branch: i32,
        min_loop: i32,
        max_loop: i32,
        min_condition: i32,
        max_condition: i32,
    ) -> Self {
        Self {
            min_statement,
            max_statement,
            min_branch,
            max_branch,
            min_loop,
            max_loop,
            min_condition,
            max_condition,
        }
        .normalized()
    }

    /// Clamp every `max` into `[0, 100]`, then every `min` into `[0, max]`
    pub fn normalize(&mut self) {
        self.max_statement = apply_range(0, self.max_statement, 100);
        self.min_statement = apply_range(0, self.min_statement, self.max_statement);
        self.max_branch = apply_range(0, self.max_branch, 100);
        self.min_branch = apply_range(0, self.min_branch, self.max_branch);
        self.max_loop = apply_range(0, self.max_loop, 100);
        self.min_loop = apply_range(0, self.min_loop, self.max_loop);
        self.max_condition = apply_range(0, self.max_condition, 100);
        self.min_condition = apply_range(0, self.min_condition, self.max_condition);
    }

    pub fn normalized(&self) -> Self {
        let mut copy = *self;
        copy.normalize();
        copy
    }

    /// `(min, max)` for a metric, as stored
    pub fn range(&self, metric: Metric) -> (i32, i32) {
        match metric {
            Metric::Statement => (self.min_statement, self.max_statement),
            Metric::Branch => (self.min_branch, self.max_branch),
            Metric::Loop => (self.min_loop, self.max_loop),
            Metric::Condition => (self.min_condition, self.max_condition),
        }
    }
}

/// Whether build health is scored at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "thresholds", rename_all = "snake_case")]
pub enum HealthReporting {
    #[default]
    Disabled,
    Enabled(Thresholds),
}

impl HealthReporting {
    pub fn thresholds(&self) -> Option<&Thresholds> {
        match self {
            HealthReporting::Disabled => None,
            HealthReporting::Enabled(thresholds) => Some(thresholds),
        }
    }
}

impl From<Option<Thresholds>> for HealthReporting {
    fn from(thresholds: Option<Thresholds>) -> Self {
        thresholds.map_or(HealthReporting::Disabled, HealthReporting::Enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_clamps_ranges() {
        let mut t = Thresholds {
            min_statement: 95,
            max_statement: 120,
            min_branch: -5,
            max_branch: 80,
            min_loop: 60,
            max_loop: 40,
            min_condition: 10,
            max_condition: -3,
        };
        t.normalize();

        assert_eq!(t.range(Metric::Statement), (95, 100));
        assert_eq!(t.range(Metric::Branch), (0, 80));
        assert_eq!(t.range(Metric::Loop), (40, 40));
        assert_eq!(t.range(Metric::Condition), (0, 0));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let t = Thresholds::new(150, 120, 30, 20, 0, 0, -1, 101);
        assert_eq!(t.normalized(), t);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let t: Thresholds = toml::from_str("min_statement = 70").unwrap();
        assert_eq!(t.range(Metric::Statement), (70, 90));
        assert_eq!(t.range(Metric::Condition), (0, 50));
    }

    #[test]
    fn test_reporting_from_option() {
        assert_eq!(HealthReporting::from(None), HealthReporting::Disabled);
        let t = Thresholds::default();
        assert_eq!(
            HealthReporting::from(Some(t)).thresholds(),
            Some(&t)
        );
    }
}
