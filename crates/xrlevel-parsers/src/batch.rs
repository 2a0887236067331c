//! Parallel decoding of many levels.
//!
//! Each file is decoded independently on the rayon pool with its own state;
//! nothing is shared between decodes except the parser's material resolver.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use xrlevel_core::Error;

use crate::level::{DecodedLevel, LevelParser};
use crate::traits::{ParseOptions, Parser};

/// What happened to one file
#[derive(Debug)]
pub enum BatchStatus {
    Decoded(Box<DecodedLevel>),
    Failed(Error),
    /// Not started because the batch was cancelled
    Skipped,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub path: PathBuf,
    pub status: BatchStatus,
    pub elapsed: Duration,
}

/// Decode every path, preserving input order in the result.
///
/// Setting `cancel` stops new files from starting; files already in flight
/// finish normally.
pub fn decode_batch(
    parser: &LevelParser,
    paths: &[PathBuf],
    options: &ParseOptions,
    cancel: Option<&AtomicBool>,
) -> Vec<BatchOutcome> {
    let span = tracing::info_span!("decode_batch", files = paths.len());
    let _guard = span.enter();

    paths
        .par_iter()
        .map(|path| decode_one(parser, path, options, cancel))
        .collect()
}

fn decode_one(parser: &LevelParser, path: &Path, options: &ParseOptions, cancel: Option<&AtomicBool>) -> BatchOutcome {
    let start = Instant::now();
    if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
        return BatchOutcome { path: path.to_path_buf(), status: BatchStatus::Skipped, elapsed: Duration::ZERO };
    }

    let status = match parser.parse_file_with_options(path, options, None) {
        Ok(decoded) => {
            tracing::info!(path = %path.display(), diagnostics = decoded.diagnostics.len(), "decoded");
            BatchStatus::Decoded(Box::new(decoded))
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "decode failed");
            BatchStatus::Failed(err)
        }
    };
    BatchOutcome { path: path.to_path_buf(), status, elapsed: start.elapsed() }
}

/// Aggregate view of a batch for display
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub decoded: usize,
    pub skipped: usize,
    pub diagnostics: usize,
    /// (path, error message) per failed file
    pub failures: Vec<(PathBuf, String)>,
    pub total_time: Duration,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: &[BatchOutcome]) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            report.total_time += outcome.elapsed;
            match &outcome.status {
                BatchStatus::Decoded(level) => {
                    report.decoded += 1;
                    report.diagnostics += level.diagnostics.len();
                }
                BatchStatus::Failed(err) => report.failures.push((outcome.path.clone(), err.to_string())),
                BatchStatus::Skipped => report.skipped += 1,
            }
        }
        report
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_batch_skips_everything() {
        let paths = vec![PathBuf::from("a/level"), PathBuf::from("b/level")];
        let cancel = AtomicBool::new(true);

        let outcomes = decode_batch(&LevelParser::new(), &paths, &ParseOptions::default(), Some(&cancel));
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o.status, BatchStatus::Skipped)));
        assert_eq!(outcomes[1].path, paths[1]);

        let report = BatchReport::from_outcomes(&outcomes);
        assert_eq!(report.skipped, 2);
        assert!(report.is_success());
    }

    #[test]
    fn test_missing_file_is_a_failure() {
        let paths = vec![PathBuf::from("/nonexistent/xrlevel/level")];
        let outcomes = decode_batch(&LevelParser::new(), &paths, &ParseOptions::default(), None);

        match &outcomes[0].status {
            BatchStatus::Failed(err) => assert!(!err.is_format_error()),
            other => panic!("Expected Failed, got {other:?}"),
        }
        let report = BatchReport::from_outcomes(&outcomes);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.is_success());
    }
}
