use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("No exchange rate within the fallback window for {requested}")]
    RateUnavailable { requested: NaiveDate },

    #[error("Invalid report range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
