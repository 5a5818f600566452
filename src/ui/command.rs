//! Text commands typed into the dashboard's command line.
//!
//! Everything is validated here, before any state is touched: symbols are
//! normalized, alert kinds and thresholds parsed.

use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::{Result, StockWatchError};
use crate::monitor::alerts::AlertKind;
use crate::monitor::store::normalize_symbol;

pub const HELP: &str = "track SYM | untrack SYM | alert SYM KIND VALUE | unalert SYM KIND | export [PATH] | clear | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Track(String),
    Untrack(String),
    SetAlert {
        symbol: String,
        kind: AlertKind,
        threshold: Decimal,
    },
    DeleteAlert {
        symbol: String,
        kind: AlertKind,
    },
    Export(Option<PathBuf>),
    Clear,
    Help,
    Quit,
}

fn parse_threshold(kind: AlertKind, raw: &str) -> Result<Decimal> {
    let cleaned = raw.trim().trim_end_matches('%').trim_start_matches('$');
    let threshold = Decimal::from_str(cleaned)
        .map_err(|_| StockWatchError::InvalidThreshold(format!("'{}' is not a number", raw)))?;
    kind.validate_threshold(threshold)?;
    Ok(threshold)
}

impl FromStr for Command {
    type Err = StockWatchError;

    fn from_str(input: &str) -> Result<Self> {
        let mut parts = input.split_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| StockWatchError::InvalidCommand("empty command".to_string()))?
            .to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();

        let usage = |text: &str| StockWatchError::InvalidCommand(format!("usage: {}", text));

        match (verb.as_str(), args.as_slice()) {
            ("track" | "add", [symbol]) => Ok(Command::Track(normalize_symbol(symbol)?)),
            ("track" | "add", _) => Err(usage("track SYMBOL")),

            ("untrack" | "remove" | "rm", [symbol]) => Ok(Command::Untrack(normalize_symbol(symbol)?)),
            ("untrack" | "remove" | "rm", _) => Err(usage("untrack SYMBOL")),

            ("alert" | "set-alert", [symbol, kind, value]) => {
                let kind = kind.parse::<AlertKind>()?;
                Ok(Command::SetAlert {
                    symbol: normalize_symbol(symbol)?,
                    kind,
                    threshold: parse_threshold(kind, value)?,
                })
            }
            ("alert" | "set-alert", _) => Err(usage("alert SYMBOL KIND VALUE")),

            ("unalert" | "delete-alert", [symbol, kind]) => Ok(Command::DeleteAlert {
                symbol: normalize_symbol(symbol)?,
                kind: kind.parse()?,
            }),
            ("unalert" | "delete-alert", _) => Err(usage("unalert SYMBOL KIND")),

            ("export", []) => Ok(Command::Export(None)),
            ("export", [path]) => Ok(Command::Export(Some(PathBuf::from(*path)))),
            ("export", _) => Err(usage("export [PATH]")),

            ("clear", []) => Ok(Command::Clear),
            ("help" | "?", []) => Ok(Command::Help),
            ("quit" | "q" | "exit", []) => Ok(Command::Quit),

            (other, _) => Err(StockWatchError::InvalidCommand(format!(
                "unknown command '{}'",
                other
            ))),
        }
    }
}
