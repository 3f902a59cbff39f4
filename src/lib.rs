//! Coverwatch - build coverage history
//!
//! Records code coverage reports per CI build and keeps them in SQLite:
//! - Parsing of HTML coverage reports into four ratios
//! - Health scoring against configurable thresholds
//! - Walking a job's build history for the last usable result
//! - Cross-job dashboard summaries and a per-date chart series

pub mod config;
pub mod coverage;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod history;
pub mod publisher;
pub mod server;

pub use coverage::{
    evaluate_health, parse_report_files, CoverageRecord, CoverageSnapshot, HealthReporting, HealthScore, Metric,
    Ratio, Thresholds,
};
pub use dashboard::{chart_data_within_range, result_summary, ChartPoint, CoverageSummary};
pub use error::ReportError;
pub use history::{last_result, previous_result, BuildCursor, BuildOutcome, JobView};
pub use publisher::{PublishRequest, Published, Publisher};
