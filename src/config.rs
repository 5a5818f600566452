//! Command-line configuration, parsed with `clap` and validated before start-up.
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

use crate::api::yahoo::YAHOO_SPARK_URL;
use crate::error::{Result, StockWatchError};
use crate::monitor::store::DEFAULT_HISTORY_LIMIT;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about = "Terminal stock price watcher with one-time alerts", long_about = None)]
pub struct Args {
    /// Symbols to track on start-up, comma separated (e.g. AAPL,MSFT,BRK-B).
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Seconds between quote refreshes.
    #[arg(long, default_value_t = 10)]
    pub interval: u64,

    /// Default destination for the `export` command.
    #[arg(long, default_value = "stock_data.csv")]
    pub export_path: PathBuf,

    /// Number of observations kept for export.
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// Quote endpoint answering the batch spark query.
    #[arg(long, default_value = YAHOO_SPARK_URL)]
    pub provider_url: String,

    /// HTTP request timeout in seconds.
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// off, error, warn, info, debug or trace.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(StockWatchError::ConfigError(
                "--interval must be at least 1 second".to_string(),
            ));
        }
        if self.timeout == 0 {
            return Err(StockWatchError::ConfigError(
                "--timeout must be at least 1 second".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(StockWatchError::ConfigError(
                "--history-limit must be positive".to_string(),
            ));
        }
        if !self.provider_url.starts_with("http://") && !self.provider_url.starts_with("https://") {
            return Err(StockWatchError::ConfigError(format!(
                "--provider-url '{}' is not an http(s) URL",
                self.provider_url
            )));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        self.log_level.parse().map_err(|_| {
            StockWatchError::ConfigError(format!("unknown --log-level '{}'", self.log_level))
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Start-up symbols with blanks from stray commas removed.
    pub fn initial_symbols(&self) -> Vec<&str> {
        self.symbols
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
