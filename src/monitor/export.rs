use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Local, SecondsFormat};
use log::info;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::monitor::store::Observation;

pub const EXPORT_HEADER: [&str; 4] = ["symbol", "timestamp", "price", "percent_change"];

/// Snapshot of one applied observation, kept for export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub symbol: String,
    pub timestamp: DateTime<Local>,
    pub price: Decimal,
    pub percent_change: Option<Decimal>,
}

impl ExportRecord {
    pub fn new(symbol: &str, observation: &Observation) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp: observation.observed_at,
            price: observation.price,
            percent_change: observation.percent_change,
        }
    }

    fn to_row(&self) -> [String; 4] {
        [
            self.symbol.clone(),
            // RFC 3339 with the local offset, e.g. 2024-03-01T09:30:01+01:00
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
            self.price.normalize().to_string(),
            self.percent_change
                .map(|pct| pct.round_dp(4).normalize().to_string())
                .unwrap_or_default(),
        ]
    }
}

/// Write `records` to `path` as CSV, grouped by symbol and in time order within a
/// symbol. An empty history still produces a file with the header row.
///
/// Returns the number of data rows written.
pub fn export<'a, I>(records: I, path: &Path) -> Result<usize>
where
    I: IntoIterator<Item = &'a ExportRecord>,
{
    let mut rows: Vec<&ExportRecord> = records.into_iter().collect();
    // Stable: keeps arrival order inside each symbol.
    rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(EXPORT_HEADER)?;
    for record in &rows {
        writer.write_record(record.to_row())?;
    }
    writer.flush()?;

    info!("Exported {} rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StockWatchError;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stockwatch-{}-{}", std::process::id(), name))
    }

    fn record(symbol: &str, second: u32, price: Decimal, prior: Decimal) -> ExportRecord {
        let at = Local.with_ymd_and_hms(2024, 3, 1, 9, 30, second).unwrap();
        ExportRecord::new(symbol, &Observation::new(price, prior, at))
    }

    #[test]
    fn test_export_groups_by_symbol() {
        let path = temp_path("grouped.csv");
        let records = vec![
            record("MSFT", 0, dec!(400), dec!(400)),
            record("AAPL", 1, dec!(150), dec!(145)),
            record("MSFT", 2, dec!(404), dec!(400)),
            record("AAPL", 3, dec!(151), dec!(0)),
        ];

        let written = export(&records, &path).unwrap();
        assert_eq!(written, 4);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "symbol,timestamp,price,percent_change");

        let cells: Vec<Vec<&str>> = lines[1..].iter().map(|l| l.split(',').collect()).collect();
        let rows: Vec<(&str, &str, &str)> =
            cells.iter().map(|c| (c[0], c[2], c[3])).collect();
        assert_eq!(
            rows,
            vec![
                ("AAPL", "150", "3.4483"),
                ("AAPL", "151", ""),
                ("MSFT", "400", "0"),
                ("MSFT", "404", "1"),
            ]
        );

        // Timestamps carry their UTC offset and round-trip to the same instant.
        let first = DateTime::parse_from_rfc3339(cells[0][1]).unwrap();
        assert_eq!(first, records[1].timestamp);
        assert!(cells[0][1].starts_with("2024-03-01T09:30:01"));
        assert!(cells[3][1].starts_with("2024-03-01T09:30:02"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_export_empty_history_writes_header() {
        let path = temp_path("empty.csv");

        let written = export(std::iter::empty(), &path).unwrap();
        assert_eq!(written, 0);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), "symbol,timestamp,price,percent_change");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_export_unwritable_path() {
        let path = temp_path("no-such-dir").join("out.csv");
        let result = export(std::iter::empty(), &path);
        assert!(matches!(result, Err(StockWatchError::IoError(_))));
    }
}
