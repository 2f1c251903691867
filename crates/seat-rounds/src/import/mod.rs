//! CSV readers for the season inputs: roster, seat matrix and the three
//! per-round decision reports.

mod decisions;
mod normalizer;
mod quota;
mod roster;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::allocation::domain::{Candidate, DecisionReport, DecisionSource};
use crate::allocation::quota::{QuotaConfig, QuotaConfigError};

pub use decisions::parse_decisions;
pub use quota::parse_quota;
pub use roster::parse_roster;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read import file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("{file} is missing the '{column}' column")]
    MissingColumn {
        file: &'static str,
        column: &'static str,
    },
    #[error("{file} line {line}: invalid {column} value '{value}'")]
    InvalidValue {
        file: &'static str,
        line: u64,
        column: String,
        value: String,
    },
    #[error("invalid seat matrix: {0}")]
    Quota(#[from] QuotaConfigError),
}

fn open(path: &Path) -> Result<BufReader<File>, ImportError> {
    Ok(BufReader::new(File::open(path)?))
}

pub fn load_roster(path: &Path) -> Result<Vec<Candidate>, ImportError> {
    parse_roster(open(path)?)
}

pub fn load_quota(path: &Path) -> Result<QuotaConfig, ImportError> {
    parse_quota(open(path)?)
}

pub fn load_decisions(source: DecisionSource, path: &Path) -> Result<DecisionReport, ImportError> {
    parse_decisions(source, open(path)?)
}
