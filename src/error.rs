use std::io;

/// Failure to extract coverage from a set of report artifacts
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("no coverage ratios found in {inputs} report input(s)")]
    NoDataFound { inputs: usize },

    #[error("failed to read report {input}: {source}")]
    Read {
        input: String,
        #[source]
        source: io::Error,
    },
}
