use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use tokio::sync::watch;

use crate::api::poller::PollEvent;
use crate::error::{Result, StockWatchError};
use crate::monitor::export;
use crate::monitor::store::normalize_symbol;
use crate::monitor::{Alert, AlertKind, ObservationStore};
use crate::ui::command::{Command, HELP};

const MAX_LOG_ENTRIES: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Alert,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

/// Foreground state: the observation store plus everything the dashboard shows
/// around it. Every mutation of the store goes through here.
pub struct App {
    store: ObservationStore,
    symbols_tx: watch::Sender<BTreeSet<String>>,
    log: VecDeque<LogEntry>,
    export_path: PathBuf,
    last_update: Option<DateTime<Local>>,
    last_error: Option<String>,
    quit_requested: bool,
}

impl App {
    pub fn new(
        store: ObservationStore,
        symbols_tx: watch::Sender<BTreeSet<String>>,
        export_path: PathBuf,
    ) -> Self {
        Self {
            store,
            symbols_tx,
            log: VecDeque::new(),
            export_path,
            last_update: None,
            last_error: None,
            quit_requested: false,
        }
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    pub fn log(&self) -> &VecDeque<LogEntry> {
        &self.log
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.last_update
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    fn push_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.log.push_back(LogEntry {
            at: Local::now(),
            level,
            message: message.into(),
        });
        while self.log.len() > MAX_LOG_ENTRIES {
            self.log.pop_front();
        }
    }

    fn publish_symbols(&self) {
        self.symbols_tx.send_replace(self.store.symbols());
    }

    /// Run a command and report its outcome in the event log.
    pub fn handle_command(&mut self, command: Command) {
        if let Err(e) = self.execute(command) {
            self.handle_command_error(e);
        }
    }

    /// Report a command that failed to parse or run. State is left untouched.
    pub fn handle_command_error(&mut self, e: StockWatchError) {
        warn!("Command failed: {}", e);
        self.push_log(LogLevel::Error, e.to_string());
    }

    pub fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Track(symbol) => self.track(&symbol).map(|_| ()),
            Command::Untrack(symbol) => self.untrack(&symbol),
            Command::SetAlert {
                symbol,
                kind,
                threshold,
            } => self.set_alert(&symbol, kind, threshold),
            Command::DeleteAlert { symbol, kind } => self.delete_alert(&symbol, kind),
            Command::Export(path) => self.export(path.as_deref()).map(|_| ()),
            Command::Clear => {
                self.clear();
                Ok(())
            }
            Command::Help => {
                self.push_log(LogLevel::Info, HELP);
                let kinds = AlertKind::ALL.map(|k| k.as_str()).join(", ");
                self.push_log(LogLevel::Info, format!("Alert kinds: {}", kinds));
                Ok(())
            }
            Command::Quit => {
                self.quit_requested = true;
                Ok(())
            }
        }
    }

    pub fn track(&mut self, symbol: &str) -> Result<String> {
        let symbol = self.store.track(symbol)?;
        info!("Tracking started for {}", symbol);
        self.push_log(LogLevel::Info, format!("Tracking started for {}", symbol));
        self.publish_symbols();
        Ok(symbol)
    }

    pub fn untrack(&mut self, symbol: &str) -> Result<()> {
        let removed = self.store.untrack(symbol)?;
        let alerts = removed.alerts().count();
        info!("Tracking stopped for {} ({} alerts dropped)", removed.symbol, alerts);
        self.push_log(
            LogLevel::Info,
            format!("Tracking stopped for {}", removed.symbol),
        );
        self.publish_symbols();
        Ok(())
    }

    pub fn set_alert(&mut self, symbol: &str, kind: AlertKind, threshold: Decimal) -> Result<()> {
        let symbol = normalize_symbol(symbol)?;
        let replaced = self
            .store
            .get(&symbol)
            .map_or(false, |t| t.alert(kind).is_some());
        let fired = self.store.set_alert(&symbol, kind, threshold)?;
        let verb = if replaced { "re-armed" } else { "set" };
        self.push_log(
            LogLevel::Info,
            format!("Alert {}: {} {} {}", verb, symbol, kind, threshold),
        );
        if let Some(alert) = fired {
            self.notify(&alert);
        }
        Ok(())
    }

    pub fn delete_alert(&mut self, symbol: &str, kind: AlertKind) -> Result<()> {
        let removed = self.store.delete_alert(symbol, kind)?;
        self.push_log(
            LogLevel::Info,
            format!("Alert deleted: {} {} {}", removed.symbol, kind, removed.threshold),
        );
        Ok(())
    }

    /// Export the accumulated history, to `path` or the configured default.
    pub fn export(&mut self, path: Option<&Path>) -> Result<usize> {
        let path = path.unwrap_or(self.export_path.as_path()).to_path_buf();
        let rows = export::export(self.store.history(), &path)?;
        self.push_log(
            LogLevel::Info,
            format!("Exported {} rows to {}", rows, path.display()),
        );
        Ok(rows)
    }

    /// Clear the event log and the export history. Tracked symbols and alerts stay.
    pub fn clear(&mut self) {
        self.log.clear();
        self.store.clear_history();
    }

    fn notify(&mut self, alert: &Alert) {
        info!("ALERT: {}", alert.describe());
        self.push_log(LogLevel::Alert, format!("ALERT: {}", alert.describe()));
    }

    /// Apply one poll result. Returns the alerts it fired.
    pub fn apply(&mut self, event: PollEvent) -> Vec<Alert> {
        match event {
            PollEvent::Quotes {
                fetched_at,
                requested,
                quotes,
            } => {
                let mut fired = Vec::new();
                for symbol in &requested {
                    // Untracked while the fetch was in flight.
                    if !self.store.is_tracked(symbol) {
                        continue;
                    }
                    let Some(quote) = quotes.get(symbol) else {
                        self.report_missing(symbol);
                        continue;
                    };
                    match self
                        .store
                        .update(symbol, quote.price, quote.prior_close, fetched_at)
                    {
                        Ok(update) => {
                            if let Some(previous) = update.previous {
                                debug!(
                                    "{} {} -> {}",
                                    symbol, previous.price, update.current.price
                                );
                            }
                            fired.extend(self.store.evaluate_alerts(symbol, &update.current));
                        }
                        Err(e) => error!("Failed to apply quote for {}: {}", symbol, e),
                    }
                }
                for alert in &fired {
                    self.notify(alert);
                }
                self.last_update = Some(fetched_at);
                self.last_error = None;
                fired
            }
            PollEvent::Failed { at, error } => {
                self.push_log(LogLevel::Error, format!("Quote fetch failed: {}", error));
                self.last_error = Some(format!("{} at {}", error, at.format("%H:%M:%S")));
                Vec::new()
            }
        }
    }

    /// A symbol that has never been quoted is unknown to the provider: drop it.
    /// One that has keeps its last values until data comes back.
    fn report_missing(&mut self, symbol: &str) {
        let confirmed = self
            .store
            .get(symbol)
            .map_or(false, |t| t.observation.is_some());
        if confirmed {
            self.push_log(LogLevel::Warn, format!("No data for {}", symbol));
            return;
        }

        if self.store.untrack(symbol).is_ok() {
            let e = StockWatchError::InvalidSymbol(symbol.to_string());
            warn!("{}: provider has no data for it", e);
            self.push_log(
                LogLevel::Error,
                format!("{}: provider has no data for it, tracking stopped", e),
            );
            self.publish_symbols();
        }
    }

    /// Track each symbol given at start-up, skipping the ones that are rejected.
    pub fn track_initial<S: AsRef<str>>(&mut self, symbols: &[S]) {
        for symbol in symbols {
            match self.track(symbol.as_ref()) {
                Ok(_) => {}
                Err(StockWatchError::AlreadyTracked(_)) => {}
                Err(e) => {
                    warn!("Skipping start-up symbol: {}", e);
                    self.push_log(LogLevel::Error, e.to_string());
                }
            }
        }
    }
}
