use thiserror::Error;

use crate::monitor::alerts::AlertKind;

#[derive(Error, Debug)]
pub enum StockWatchError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Quote provider error: {0}")]
    ProviderError(String),

    #[error("Invalid symbol: '{0}'")]
    InvalidSymbol(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Unknown alert kind '{0}' (expected price-above, price-below, pct-above or pct-below)")]
    UnknownAlertKind(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("{0} is already being tracked")]
    AlreadyTracked(String),

    #[error("{0} is not being tracked")]
    NotTracked(String),

    #[error("No {kind} alert set for {symbol}")]
    AlertNotFound { symbol: String, kind: AlertKind },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

pub type Result<T, E = StockWatchError> = std::result::Result<T, E>;
