use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("missing input for {label}: {stem}[{}]", tried.join("|"))]
    MissingInput {
        label: String,
        stem: String,
        tried: Vec<String>,
    },

    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("invalid report date {0}: expected YYYYMMDD")]
    InvalidDate(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workbook write error: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),
}

impl ReportError {
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ReportError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
