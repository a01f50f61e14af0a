// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per (epoch, cutoff) to
// <save_path>/metrics.csv:
//
//   epoch,cutoff,positives,recall,precision,f1,loss
//   1,strict,132,0.412000,0.281000,0.334100,5120.331000
//   1,k=0.2,840,0.903000,0.098000,0.176800,5120.331000
//   ...
//
// `positives` is the number of spans predicted as mentions,
// `loss` the summed training loss of that epoch.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::ml::evaluation::Evaluation;

const HEADER: &str = "epoch,cutoff,positives,recall,precision,f1,loss";

/// Which selection rule produced a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cutoff {
    Strict,
    Fraction(f64),
}

impl std::fmt::Display for Cutoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict      => write!(f, "strict"),
            Self::Fraction(k) => write!(f, "k={k}"),
        }
    }
}

/// One row of the metrics log.
#[derive(Debug, Clone, Copy)]
pub struct EpochMetrics {
    pub epoch:      usize,
    pub cutoff:     Cutoff,
    pub evaluation: Evaluation,
    pub train_loss: f64,
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the header when the file is new; existing logs are appended to.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{},{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch,
            m.cutoff,
            m.evaluation.predicted,
            m.evaluation.recall(),
            m.evaluation.precision(),
            m.evaluation.f1(),
            m.train_loss,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_appended_under_one_header() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        let eval   = Evaluation::new(&[true, true, false], &[true, false, false]).unwrap();

        logger.log(&EpochMetrics { epoch: 1, cutoff: Cutoff::Strict, evaluation: eval, train_loss: 2.5 }).unwrap();
        logger.log(&EpochMetrics { epoch: 1, cutoff: Cutoff::Fraction(0.25), evaluation: eval, train_loss: 2.5 }).unwrap();

        // reopening keeps the existing rows
        let logger = MetricsLogger::new(dir.path()).unwrap();
        let text   = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "1,strict,2,1.000000,0.500000,0.666667,2.500000");
        assert!(lines[2].starts_with("1,k=0.25,2,"));
    }
}
