use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("required input is missing: {0:?}")]
    MissingInput(PathBuf),

    #[error("{0} required inputs are missing")]
    Preflight(usize),

    #[error("failed to open annotation file: {1:?}")]
    OpenAnnotationFile(#[source] std::io::Error, PathBuf),

    #[error("failed to parse annotation file as JSON: {1:?}")]
    ParseAnnotationFile(#[source] serde_json::Error, PathBuf),

    #[error("annotation entry {0} has no annotation result sets")]
    EmptyAnnotationEntry(i64),

    #[error("annotation entry {0} result {1} has no frame ranges")]
    MissingRanges(i64, usize),

    #[error("annotation entry {0} result {1} has no timeline labels")]
    MissingTimelineLabels(i64, usize),

    #[error("configured landmark index {index} for {name} is out of range for a {count}-point skeleton")]
    LandmarkIndexOutOfRange {
        name: &'static str,
        index: usize,
        count: usize,
    },

    #[error("frame {frame} carries {got} landmarks, expected {expected}")]
    LandmarkCountMismatch {
        frame: u64,
        expected: usize,
        got: usize,
    },

    #[error("failed to open pose stream: {1:?}")]
    OpenPoseStream(#[source] std::io::Error, PathBuf),

    #[error("pose stream {0:?} is empty: expected a metadata header line")]
    MissingStreamHeader(PathBuf),

    #[error("failed to read line {1} of pose stream {2:?}")]
    ReadStreamLine(#[source] std::io::Error, usize, PathBuf),

    #[error("failed to parse line {1} of pose stream {2:?}")]
    ParseStreamLine(#[source] serde_json::Error, usize, PathBuf),

    #[error("pose stream frame indices must be strictly increasing: got {got} after {prev}")]
    NonMonotonicFrames { prev: u64, got: u64 },

    #[error("failed to create output file: {1:?}")]
    CreateOutput(#[source] csv::Error, PathBuf),

    #[error("failed to write CSV row")]
    WriteRow(#[source] csv::Error),

    #[error("failed to flush CSV output")]
    FlushOutput(#[source] std::io::Error),

    #[error("failed to open table: {1:?}")]
    OpenTable(#[source] csv::Error, PathBuf),

    #[error("failed to read table header: {1:?}")]
    ReadHeader(#[source] csv::Error, PathBuf),

    #[error("failed to read table row")]
    ReadRow(#[source] csv::Error),

    #[error("table is missing expected column {0:?}")]
    MissingColumn(String),

    #[error("failed to parse column {column:?} value {value:?} on row {row}")]
    ParseColumn {
        column: String,
        value: String,
        row: usize,
    },

    #[error("unknown label match policy {0:?}, expected first-match or most-specific")]
    ParseMatchPolicy(String),
}
