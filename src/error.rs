use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No {series} records fall inside the baseline window {start}..{end}")]
    EmptyBaseline {
        series: &'static str,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Invalid period format: {0}")]
    PeriodParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
