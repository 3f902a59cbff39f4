//! Ratio extraction from HTML coverage reports
//!
//! Reports are scanned line by line rather than parsed as markup. Any line
//! carrying `covered&nbsp;/&nbsp;total` is a ratio; the first four found fill
//! the statement, branch, loop and condition slots in that order.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use tracing::{debug, warn};

use super::{CoverageSnapshot, Metric, Ratio};
use crate::error::ReportError;

/// Separator between numerator and denominator in a report line
pub const RATIO_MARKER: &str = "&nbsp;/&nbsp;";

/// Ordered report artifacts for one build
pub trait ReportSource {
    type Reader: Read;

    fn report_count(&self) -> usize;

    /// Human readable name of the report at `index`, for errors and logs
    fn describe(&self, index: usize) -> String;

    fn open(&self, index: usize) -> io::Result<Self::Reader>;
}

impl<P: AsRef<Path>> ReportSource for [P] {
    type Reader = File;

    fn report_count(&self) -> usize {
        self.len()
    }

    fn describe(&self, index: usize) -> String {
        self[index].as_ref().display().to_string()
    }

    fn open(&self, index: usize) -> io::Result<File> {
        File::open(self[index].as_ref())
    }
}

/// Line scanner whose slot state carries across every input it is fed
#[derive(Debug, Default)]
pub struct ReportScanner {
    slots: [Option<Ratio>; 4],
    filled: usize,
    inputs: usize,
}

impl ReportScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.filled == Metric::ALL.len()
    }

    /// Scan one line; returns true if it filled a slot
    pub fn scan_line(&mut self, line: &str) -> bool {
        if self.is_complete() || !line.contains(RATIO_MARKER) {
            return false;
        }

        let ratio = parse_entry(line.trim());
        let metric = Metric::ALL[self.filled];
        if ratio == Ratio::MALFORMED {
            warn!(metric = %metric, line = line.trim(), "malformed coverage entry");
        } else {
            debug!(metric = %metric, ratio = %ratio, "coverage entry");
        }

        self.slots[self.filled] = Some(ratio);
        self.filled += 1;
        true
    }

    /// Scan a whole input, stopping as soon as the fourth slot is filled.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn scan<R: BufRead>(&mut self, mut reader: R) -> io::Result<()> {
        self.inputs += 1;
        let mut buf = Vec::new();

        while !self.is_complete() {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            self.scan_line(&String::from_utf8_lossy(&buf));
        }

        Ok(())
    }

    pub fn scan_str(&mut self, content: &str) {
        self.inputs += 1;
        for line in content.lines() {
            if self.is_complete() {
                break;
            }
            self.scan_line(line);
        }
    }

    /// Snapshot of the filled slots. Fails only when nothing matched at all.
    pub fn finish(self) -> Result<CoverageSnapshot, ReportError> {
        if self.filled == 0 {
            return Err(ReportError::NoDataFound {
                inputs: self.inputs,
            });
        }
        Ok(CoverageSnapshot::from_slots(self.slots))
    }
}

fn parse_entry(line: &str) -> Ratio {
    let mut parts = line.split(RATIO_MARKER);
    let numerator = parts.next().and_then(|p| p.parse::<i32>().ok());
    let denominator = parts.next().and_then(|p| p.parse::<i32>().ok());

    match (numerator, denominator) {
        (Some(n), Some(d)) => Ratio::new(n as f64, d as f64),
        _ => Ratio::MALFORMED,
    }
}

/// Parse every report of a source in order. Reports after the fourth ratio
/// are not opened; each opened report is closed before the next one is.
pub fn parse_reports<S: ReportSource + ?Sized>(source: &S) -> Result<CoverageSnapshot, ReportError> {
    let mut scanner = ReportScanner::new();

    for index in 0..source.report_count() {
        if scanner.is_complete() {
            debug!(report = %source.describe(index), "all ratios found, skipping report");
            continue;
        }

        let read_error = |source_err: io::Error| ReportError::Read {
            input: source.describe(index),
            source: source_err,
        };
        let reader = source.open(index).map_err(read_error)?;
        scanner.scan(BufReader::new(reader)).map_err(read_error)?;
    }

    scanner.finish()
}

/// Parse report files in the order given
pub fn parse_report_files<P: AsRef<Path>>(paths: &[P]) -> Result<CoverageSnapshot, ReportError> {
    parse_reports(paths)
}

/// Parse report content from a string
pub fn parse_report_string(content: &str) -> Result<CoverageSnapshot, ReportError> {
    let mut scanner = ReportScanner::new();
    scanner.scan_str(content);
    scanner.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const REPORT: &str = r#"
<html><body><table>
<tr><td>Statement</td><td>
    10&nbsp;/&nbsp;20
</td></tr>
<tr><td>Branch</td><td>
    oops&nbsp;/&nbsp;5
</td></tr>
<tr><td>Loop</td><td>
    7&nbsp;/&nbsp;9
</td></tr>
<tr><td>Condition</td><td>
    1&nbsp;/&nbsp;2
</td></tr>
<tr><td>Extra</td><td>
    3&nbsp;/&nbsp;3
</td></tr>
</table></body></html>
"#;

    #[test]
    fn test_ratios_assigned_in_order() {
        let snapshot = parse_report_string(REPORT).unwrap();

        assert_eq!(snapshot.statement, Some(Ratio::new(10.0, 20.0)));
        assert_eq!(snapshot.branch, Some(Ratio::MALFORMED));
        assert_eq!(snapshot.loops, Some(Ratio::new(7.0, 9.0)));
        assert_eq!(snapshot.condition, Some(Ratio::new(1.0, 2.0)));
    }

    #[test]
    fn test_missing_denominator_is_malformed() {
        let snapshot = parse_report_string("12&nbsp;/&nbsp;").unwrap();
        assert_eq!(snapshot.statement, Some(Ratio::MALFORMED));
    }

    #[test]
    fn test_no_markers_is_fatal() {
        let err = parse_report_string("<html><td>10 / 20</td></html>").unwrap_err();
        assert!(matches!(err, ReportError::NoDataFound { inputs: 1 }));
    }

    #[test]
    fn test_partial_report_leaves_slots_empty() {
        let snapshot = parse_report_string("5&nbsp;/&nbsp;10\n6&nbsp;/&nbsp;8\n").unwrap();

        assert_eq!(snapshot.present_count(), 2);
        assert_eq!(snapshot.loops, None);
        assert_eq!(snapshot.condition, None);
    }

    #[test]
    fn test_slots_carry_across_inputs() {
        let mut scanner = ReportScanner::new();
        scanner.scan_str("1&nbsp;/&nbsp;2\n3&nbsp;/&nbsp;4");
        scanner.scan_str("<p>nothing here</p>");
        scanner.scan("5&nbsp;/&nbsp;6\n7&nbsp;/&nbsp;8\n9&nbsp;/&nbsp;10\n".as_bytes()).unwrap();

        let snapshot = scanner.finish().unwrap();
        assert_eq!(snapshot.statement, Some(Ratio::new(1.0, 2.0)));
        assert_eq!(snapshot.branch, Some(Ratio::new(3.0, 4.0)));
        assert_eq!(snapshot.loops, Some(Ratio::new(5.0, 6.0)));
        assert_eq!(snapshot.condition, Some(Ratio::new(7.0, 8.0)));
    }

    #[test]
    fn test_invalid_utf8_is_tolerated() {
        let mut scanner = ReportScanner::new();
        let bytes: &[u8] = b"\xff\xfe garbage\n4&nbsp;/&nbsp;8\n";
        scanner.scan(bytes).unwrap();
        assert_eq!(scanner.finish().unwrap().statement, Some(Ratio::new(4.0, 8.0)));
    }

    #[test]
    fn test_parse_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("report.html");
        let second = dir.path().join("report1.html");
        fs::write(&first, "1&nbsp;/&nbsp;1\n2&nbsp;/&nbsp;2\n").unwrap();
        fs::write(&second, "3&nbsp;/&nbsp;3\n4&nbsp;/&nbsp;4\n").unwrap();

        let snapshot = parse_report_files(&[first, second]).unwrap();
        assert_eq!(snapshot.present_count(), 4);
        assert_eq!(snapshot.condition, Some(Ratio::new(4.0, 4.0)));
    }

    #[test]
    fn test_reports_after_fourth_ratio_are_not_opened() {
        let dir = tempfile::tempdir().unwrap();
        let full = dir.path().join("report.html");
        fs::write(&full, REPORT).unwrap();
        let missing = dir.path().join("does-not-exist.html");

        assert!(parse_report_files(&[full, missing]).is_ok());
    }

    #[test]
    fn test_unreadable_report_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.html");

        let err = parse_report_files(&[missing]).unwrap_err();
        assert!(matches!(err, ReportError::Read { .. }));
    }

    #[test]
    fn test_zero_inputs_is_fatal() {
        let paths: [&Path; 0] = [];
        assert!(matches!(
            parse_report_files(&paths),
            Err(ReportError::NoDataFound { inputs: 0 })
        ));
    }
}
