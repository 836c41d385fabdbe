use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid search term: {0}")]
    InvalidQuery(String),

    #[error("result count {0} is out of range (expected 10..=10000)")]
    InvalidRetmax(u32),

    #[error("invalid record identifier: {0:?}")]
    InvalidRecordId(String),

    #[error("chunk size {0} is out of range (expected 1..=500)")]
    InvalidChunkSize(usize),

    #[error("invalid extraction rule for column {column}: {reason}")]
    InvalidRule { column: String, reason: String },

    #[error("invalid filter: {0}")]
    #[diagnostic(help("use COLUMN=VALUE, e.g. Longitudinal=Yes"))]
    InvalidFilter(String),

    #[error("E-utilities request failed: {0}")]
    EutilsHttp(String),

    #[error("E-utilities returned status {status}: {message}")]
    EutilsStatus { status: u16, message: String },

    #[error("E-utilities returned an unreadable body: {0}")]
    EutilsParse(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to write CSV: {0}")]
    CsvWrite(String),
}

impl KiraError {
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            KiraError::EutilsHttp(_) | KiraError::EutilsStatus { .. } | KiraError::EutilsParse(_)
        )
    }
}
