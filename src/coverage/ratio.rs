//! Covered/total ratios

use serde::{Deserialize, Serialize};
use std::fmt;

/// Covered vs. total count for one coverage metric.
///
/// A zero denominator is the "no data" state and yields a percentage of 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    numerator: f64,
    denominator: f64,
}

impl Ratio {
    /// Marker for an entry that was present in a report but could not be read
    pub const MALFORMED: Ratio = Ratio {
        numerator: -1.0,
        denominator: -1.0,
    };

    pub fn new(numerator: f64, denominator: f64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn numerator(&self) -> f64 {
        self.numerator
    }

    pub fn denominator(&self) -> f64 {
        self.denominator
    }

    /// Unrounded percentage, used when accumulating across builds or jobs
    pub fn percentage_float(&self) -> f64 {
        if self.denominator == 0.0 {
            return 0.0;
        }
        100.0 * self.numerator / self.denominator
    }

    /// Percentage rounded to the nearest integer
    pub fn percentage(&self) -> i32 {
        self.percentage_float().round() as i32
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}
