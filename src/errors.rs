use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("geocoder request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoder returned status {status} for query \"{query}\"")]
    UpstreamStatus { status: u16, query: String },
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Config(String),
    #[error("invalid input table: {0}")]
    Schema(String),
    #[error("batch cancelled after {processed} rows ({pending} pending)")]
    Cancelled { processed: usize, pending: usize },
}
