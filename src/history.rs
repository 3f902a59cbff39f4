//! Build history traversal
//!
//! Builds are reached through a [`BuildCursor`] that only knows its own
//! predecessor, so history is walked lazily and never loaded up front by
//! the walker itself.

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::coverage::CoverageRecord;

/// Result status of a finished build, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    Success,
    Unstable,
    Failure,
    Aborted,
}

impl BuildOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildOutcome::Success => "success",
            BuildOutcome::Unstable => "unstable",
            BuildOutcome::Failure => "failure",
            BuildOutcome::Aborted => "aborted",
        }
    }

    pub fn is_worse_than(&self, other: BuildOutcome) -> bool {
        *self > other
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildOutcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(BuildOutcome::Success),
            "unstable" => Ok(BuildOutcome::Unstable),
            "failure" => Ok(BuildOutcome::Failure),
            "aborted" => Ok(BuildOutcome::Aborted),
            _ => bail!("Unknown build outcome: {}. Supported: success, unstable, failure, aborted", s),
        }
    }
}

/// A position in a job's build history
pub trait BuildCursor: Sized {
    fn number(&self) -> u64;

    fn timestamp(&self) -> DateTime<Utc>;

    fn outcome(&self) -> BuildOutcome;

    /// The build that ran before this one
    fn previous(&self) -> Option<Self>;

    /// Coverage recorded for this build, if any
    fn coverage(&self) -> Option<Arc<CoverageRecord>>;

    fn is_failure(&self) -> bool {
        self.outcome() == BuildOutcome::Failure
    }
}

/// A job whose builds can be walked from the newest one
pub trait JobView {
    type Build: BuildCursor;

    /// Stable identity, used to avoid counting a job twice
    fn name(&self) -> &str;

    fn latest_build(&self) -> Option<Self::Build>;

    /// Newest build that finished as success or unstable
    fn latest_successful_build(&self) -> Option<Self::Build> {
        builds_from(self.latest_build())
            .find(|b| matches!(b.outcome(), BuildOutcome::Success | BuildOutcome::Unstable))
    }
}

/// Newest-to-oldest iterator over a build history
#[derive(Debug, Clone)]
pub struct Builds<C> {
    next: Option<C>,
}

impl<C: BuildCursor> Iterator for Builds<C> {
    type Item = C;

    fn next(&mut self) -> Option<C> {
        let current = self.next.take()?;
        self.next = current.previous();
        Some(current)
    }
}

/// Iterate from `start` (inclusive) back to the oldest build
pub fn builds_from<C: BuildCursor>(start: Option<C>) -> Builds<C> {
    Builds { next: start }
}

/// Iterate over the builds before `start`
pub fn ancestors<C: BuildCursor>(start: &C) -> Builds<C> {
    builds_from(start.previous())
}

/// First usable coverage in a newest-to-oldest walk: failed builds are passed
/// over without looking at their coverage, builds without coverage are passed over.
fn first_usable<C: BuildCursor>(builds: Builds<C>) -> Option<Arc<CoverageRecord>> {
    builds
        .filter(|b| !b.is_failure())
        .find_map(|b| b.coverage())
}

/// Coverage of the nearest earlier build usable for trend comparison
pub fn previous_result<C: BuildCursor>(start: &C) -> Option<Arc<CoverageRecord>> {
    first_usable(ancestors(start))
}

/// Most recent usable coverage of a job, the latest build included
pub fn last_result<J: JobView>(job: &J) -> Option<Arc<CoverageRecord>> {
    first_usable(builds_from(job.latest_build()))
}

/// One build in an in-memory history
#[derive(Debug, Clone)]
pub struct BuildEntry {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
    pub outcome: BuildOutcome,
    pub coverage: Option<Arc<CoverageRecord>>,
}

/// A job's history held in memory, ordered by build number
#[derive(Debug, Clone)]
pub struct JobHistory {
    name: String,
    builds: Arc<Vec<BuildEntry>>,
}

impl JobHistory {
    pub fn new(name: &str, mut builds: Vec<BuildEntry>) -> Self {
        builds.sort_by_key(|b| b.number);
        Self {
            name: name.to_string(),
            builds: Arc::new(builds),
        }
    }

    pub fn len(&self) -> usize {
        self.builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }

    pub fn build(&self, number: u64) -> Option<HistoryCursor> {
        let index = self.builds.binary_search_by_key(&number, |b| b.number).ok()?;
        Some(HistoryCursor {
            builds: Arc::clone(&self.builds),
            index,
        })
    }
}

impl JobView for JobHistory {
    type Build = HistoryCursor;

    fn name(&self) -> &str {
        &self.name
    }

    fn latest_build(&self) -> Option<HistoryCursor> {
        let index = self.builds.len().checked_sub(1)?;
        Some(HistoryCursor {
            builds: Arc::clone(&self.builds),
            index,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HistoryCursor {
    builds: Arc<Vec<BuildEntry>>,
    index: usize,
}

impl HistoryCursor {
    pub fn entry(&self) -> &BuildEntry {
        &self.builds[self.index]
    }
}

impl BuildCursor for HistoryCursor {
    fn number(&self) -> u64 {
        self.entry().number
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.entry().timestamp
    }

    fn outcome(&self) -> BuildOutcome {
        self.entry().outcome
    }

    fn previous(&self) -> Option<Self> {
        let index = self.index.checked_sub(1)?;
        Some(Self {
            builds: Arc::clone(&self.builds),
            index,
        })
    }

    fn coverage(&self) -> Option<Arc<CoverageRecord>> {
        self.entry().coverage.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageSnapshot, HealthReporting, Ratio};
    use chrono::TimeZone;
    use std::cell::Cell;
    use std::rc::Rc;

    fn record(build: u64) -> Arc<CoverageRecord> {
        Arc::new(CoverageRecord::new(
            "job",
            build,
            CoverageSnapshot::from_slots([Some(Ratio::new(build as f64, 10.0)), None, None, None]),
            HealthReporting::Disabled,
        ))
    }

    fn entry(number: u64, outcome: BuildOutcome, covered: bool) -> BuildEntry {
        BuildEntry {
            number,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            outcome,
            coverage: covered.then(|| record(number)),
        }
    }

    /// Cursor over a fixed newest-first list that counts coverage lookups
    #[derive(Clone)]
    struct CountingCursor {
        builds: Rc<Vec<BuildEntry>>,
        index: usize,
        inspected: Rc<Cell<Vec<u64>>>,
    }

    impl BuildCursor for CountingCursor {
        fn number(&self) -> u64 {
            self.builds[self.index].number
        }

        fn timestamp(&self) -> DateTime<Utc> {
            self.builds[self.index].timestamp
        }

        fn outcome(&self) -> BuildOutcome {
            self.builds[self.index].outcome
        }

        fn previous(&self) -> Option<Self> {
            (self.index + 1 < self.builds.len()).then(|| CountingCursor {
                index: self.index + 1,
                ..self.clone()
            })
        }

        fn coverage(&self) -> Option<Arc<CoverageRecord>> {
            let mut seen = self.inspected.take();
            seen.push(self.number());
            self.inspected.set(seen);
            self.builds[self.index].coverage.clone()
        }
    }

    #[test]
    fn test_previous_result_skips_failures() {
        // newest first: current, F, U(cov), S(no cov), S2(cov)
        let builds = Rc::new(vec![
            entry(5, BuildOutcome::Success, true),
            entry(4, BuildOutcome::Failure, true),
            entry(3, BuildOutcome::Unstable, true),
            entry(2, BuildOutcome::Success, false),
            entry(1, BuildOutcome::Success, true),
        ]);
        let inspected = Rc::new(Cell::new(Vec::new()));
        let start = CountingCursor {
            builds,
            index: 0,
            inspected: Rc::clone(&inspected),
        };

        let found = previous_result(&start).unwrap();
        assert_eq!(found.build, 3);
        // the failed build and the older builds are never asked for coverage
        assert_eq!(inspected.take(), vec![3]);
    }

    #[test]
    fn test_missing_coverage_keeps_walking() {
        let history = JobHistory::new(
            "job",
            vec![
                entry(1, BuildOutcome::Success, true),
                entry(2, BuildOutcome::Success, false),
                entry(3, BuildOutcome::Unstable, false),
                entry(4, BuildOutcome::Success, true),
            ],
        );

        let start = history.build(4).unwrap();
        assert_eq!(previous_result(&start).unwrap().build, 1);
    }

    #[test]
    fn test_history_exhausted() {
        let history = JobHistory::new(
            "job",
            vec![
                entry(1, BuildOutcome::Failure, true),
                entry(2, BuildOutcome::Success, true),
            ],
        );

        assert!(previous_result(&history.build(2).unwrap()).is_none());
        assert!(previous_result(&history.build(1).unwrap()).is_none());
    }

    #[test]
    fn test_last_result_includes_latest() {
        let history = JobHistory::new(
            "job",
            vec![
                entry(1, BuildOutcome::Success, true),
                entry(2, BuildOutcome::Unstable, true),
                entry(3, BuildOutcome::Failure, true),
            ],
        );

        assert_eq!(last_result(&history).unwrap().build, 2);
        assert!(last_result(&JobHistory::new("empty", Vec::new())).is_none());
    }

    #[test]
    fn test_latest_successful_build() {
        let history = JobHistory::new(
            "job",
            vec![
                entry(1, BuildOutcome::Success, false),
                entry(2, BuildOutcome::Unstable, false),
                entry(3, BuildOutcome::Aborted, false),
                entry(4, BuildOutcome::Failure, false),
            ],
        );

        assert_eq!(history.latest_successful_build().unwrap().number(), 2);
    }

    #[test]
    fn test_long_history_is_walked_iteratively() {
        let mut builds: Vec<BuildEntry> = (2..=200_000)
            .map(|n| entry(n, BuildOutcome::Failure, false))
            .collect();
        builds.push(entry(1, BuildOutcome::Success, true));
        let history = JobHistory::new("job", builds);

        let latest = history.latest_build().unwrap();
        assert_eq!(previous_result(&latest).unwrap().build, 1);
        assert_eq!(builds_from(Some(latest)).count(), 200_000);
    }

    #[test]
    fn test_outcome_parsing() {
        assert_eq!("Unstable".parse::<BuildOutcome>().unwrap(), BuildOutcome::Unstable);
        assert!("broken".parse::<BuildOutcome>().is_err());
        assert!(BuildOutcome::Failure.is_worse_than(BuildOutcome::Unstable));
        assert!(!BuildOutcome::Unstable.is_worse_than(BuildOutcome::Unstable));
    }
}
