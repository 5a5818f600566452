use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Local};
use log::debug;
use rust_decimal::Decimal;

use crate::error::{Result, StockWatchError};
use crate::monitor::alerts::{Alert, AlertKind};
use crate::monitor::export::ExportRecord;

pub const DEFAULT_HISTORY_LIMIT: usize = 500;

const MAX_SYMBOL_LEN: usize = 12;

/// Trim and upper-case a user supplied ticker, rejecting anything that is not one.
///
/// Accepts letters, digits and the punctuation Yahoo uses in tickers
/// (`BRK-B`, `^GSPC`, `EURUSD=X`, `RY.TO`).
pub fn normalize_symbol(raw: &str) -> Result<String> {
    let symbol = raw.trim().to_ascii_uppercase();

    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol.chars().any(|c| c.is_ascii_alphanumeric())
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));

    if valid {
        Ok(symbol)
    } else {
        Err(StockWatchError::InvalidSymbol(raw.trim().to_string()))
    }
}

/// (price - prior) / prior * 100, or `None` when there is no usable prior close.
pub fn percent_change(price: Decimal, prior_close: Decimal) -> Option<Decimal> {
    if prior_close.is_zero() {
        return None;
    }
    (price - prior_close)
        .checked_div(prior_close)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub price: Decimal,
    pub prior_close: Decimal,
    pub percent_change: Option<Decimal>,
    pub observed_at: DateTime<Local>,
}

impl Observation {
    pub fn new(price: Decimal, prior_close: Decimal, observed_at: DateTime<Local>) -> Self {
        Self {
            price,
            prior_close,
            percent_change: percent_change(price, prior_close),
            observed_at,
        }
    }
}

/// Result of [`ObservationStore::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationUpdate {
    pub previous: Option<Observation>,
    pub current: Observation,
}

#[derive(Debug, Clone)]
pub struct TrackedSymbol {
    pub symbol: String,
    pub observation: Option<Observation>,
    alerts: BTreeMap<AlertKind, Alert>,
}

impl TrackedSymbol {
    fn new(symbol: String) -> Self {
        Self {
            symbol,
            observation: None,
            alerts: BTreeMap::new(),
        }
    }

    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.values()
    }

    pub fn alert(&self, kind: AlertKind) -> Option<&Alert> {
        self.alerts.get(&kind)
    }
}

/// Tracked symbols, their latest observation, their alerts, and the rows
/// accumulated for export. Owned by the foreground and never shared.
#[derive(Debug)]
pub struct ObservationStore {
    symbols: BTreeMap<String, TrackedSymbol>,
    history: VecDeque<ExportRecord>,
    history_limit: usize,
}

impl Default for ObservationStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ObservationStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            symbols: BTreeMap::new(),
            history: VecDeque::with_capacity(history_limit.min(DEFAULT_HISTORY_LIMIT)),
            history_limit,
        }
    }

    /// Start tracking `symbol`. Returns the normalized ticker.
    pub fn track(&mut self, symbol: &str) -> Result<String> {
        let symbol = normalize_symbol(symbol)?;
        if self.symbols.contains_key(&symbol) {
            return Err(StockWatchError::AlreadyTracked(symbol));
        }
        self.symbols
            .insert(symbol.clone(), TrackedSymbol::new(symbol.clone()));
        Ok(symbol)
    }

    /// Stop tracking `symbol`, discarding its alerts with it.
    pub fn untrack(&mut self, symbol: &str) -> Result<TrackedSymbol> {
        let symbol = normalize_symbol(symbol)?;
        self.symbols
            .remove(&symbol)
            .ok_or(StockWatchError::NotTracked(symbol))
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&TrackedSymbol> {
        self.symbols.get(symbol)
    }

    pub fn symbols(&self) -> BTreeSet<String> {
        self.symbols.keys().cloned().collect()
    }

    pub fn tracked(&self) -> impl Iterator<Item = &TrackedSymbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Record a fresh quote for `symbol` and append it to the export history.
    pub fn update(
        &mut self,
        symbol: &str,
        price: Decimal,
        prior_close: Decimal,
        observed_at: DateTime<Local>,
    ) -> Result<ObservationUpdate> {
        let tracked = self
            .symbols
            .get_mut(symbol)
            .ok_or_else(|| StockWatchError::NotTracked(symbol.to_string()))?;

        let current = Observation::new(price, prior_close, observed_at);
        let previous = tracked.observation.replace(current);

        self.history.push_back(ExportRecord::new(symbol, &current));
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }

        Ok(ObservationUpdate { previous, current })
    }

    /// Fire every armed alert on `symbol` that `observation` satisfies.
    pub fn evaluate_alerts(&mut self, symbol: &str, observation: &Observation) -> Vec<Alert> {
        let Some(tracked) = self.symbols.get_mut(symbol) else {
            return Vec::new();
        };

        tracked
            .alerts
            .values_mut()
            .filter_map(|alert| alert.try_fire(observation).then(|| alert.clone()))
            .collect()
    }

    /// Install (or replace and re-arm) the `kind` alert on `symbol`.
    ///
    /// If the symbol already has an observation the new alert is checked against it
    /// straight away; the alert is returned when that check fires it.
    pub fn set_alert(
        &mut self,
        symbol: &str,
        kind: AlertKind,
        threshold: Decimal,
    ) -> Result<Option<Alert>> {
        kind.validate_threshold(threshold)?;
        let symbol = normalize_symbol(symbol)?;
        let tracked = self
            .symbols
            .get_mut(&symbol)
            .ok_or_else(|| StockWatchError::NotTracked(symbol.clone()))?;

        let mut alert = Alert::new(symbol.clone(), kind, threshold);
        let fired = match tracked.observation {
            Some(observation) => alert.try_fire(&observation),
            None => false,
        };
        debug!("Alert set: {} {} {} (fired: {})", symbol, kind, threshold, fired);

        tracked.alerts.insert(kind, alert.clone());
        Ok(fired.then_some(alert))
    }

    pub fn delete_alert(&mut self, symbol: &str, kind: AlertKind) -> Result<Alert> {
        let symbol = normalize_symbol(symbol)?;
        let tracked = self
            .symbols
            .get_mut(&symbol)
            .ok_or_else(|| StockWatchError::NotTracked(symbol.clone()))?;

        tracked
            .alerts
            .remove(&kind)
            .ok_or(StockWatchError::AlertNotFound { symbol, kind })
    }

    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.symbols.values().flat_map(|t| t.alerts.values())
    }

    pub fn history(&self) -> &VecDeque<ExportRecord> {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store_with(symbols: &[&str]) -> ObservationStore {
        let mut store = ObservationStore::default();
        for symbol in symbols {
            store.track(symbol).unwrap();
        }
        store
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_symbol("brk-b").unwrap(), "BRK-B");
        assert_eq!(normalize_symbol("^gspc").unwrap(), "^GSPC");
        assert_eq!(normalize_symbol("eurusd=x").unwrap(), "EURUSD=X");

        for bad in ["", "   ", "AA PL", "$$$", "---", "TOOLONGSYMBOLNAME"] {
            assert!(
                matches!(normalize_symbol(bad), Err(StockWatchError::InvalidSymbol(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_track_rejects_duplicates_and_garbage() {
        let mut store = store_with(&["AAPL"]);

        assert!(matches!(store.track("aapl"), Err(StockWatchError::AlreadyTracked(_))));
        assert!(matches!(store.track("a b"), Err(StockWatchError::InvalidSymbol(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_recomputes_percent_change() {
        let mut store = store_with(&["AAPL"]);
        let now = Local::now();

        let first = store.update("AAPL", dec!(150), dec!(145), now).unwrap();
        assert!(first.previous.is_none());
        assert_eq!(first.current.percent_change.unwrap().round_dp(2), dec!(3.45));

        let second = store.update("AAPL", dec!(140), dec!(145), now).unwrap();
        assert_eq!(second.previous, Some(first.current));
        assert_eq!(second.current.percent_change.unwrap().round_dp(2), dec!(-3.45));

        // New prior close (next session) is picked up as well.
        let third = store.update("AAPL", dec!(140), dec!(140), now).unwrap();
        assert_eq!(third.current.percent_change, Some(Decimal::ZERO));

        let tracked = store.get("AAPL").unwrap();
        assert_eq!(tracked.observation, Some(third.current));
    }

    #[test]
    fn test_zero_prior_close_has_no_percent() {
        assert_eq!(percent_change(dec!(10), Decimal::ZERO), None);
        assert_eq!(percent_change(dec!(110), dec!(100)), Some(dec!(10)));
    }

    #[test]
    fn test_update_untracked_symbol() {
        let mut store = ObservationStore::default();
        let result = store.update("AAPL", dec!(1), dec!(1), Local::now());
        assert!(matches!(result, Err(StockWatchError::NotTracked(_))));
        assert!(store.history().is_empty());
    }

    #[test]
    fn test_evaluate_alerts_fires_once() {
        let mut store = store_with(&["AAPL"]);
        store.set_alert("AAPL", AlertKind::PriceAbove, dec!(100)).unwrap();
        store.set_alert("AAPL", AlertKind::PriceBelow, dec!(50)).unwrap();

        let update = store.update("AAPL", dec!(120), dec!(110), Local::now()).unwrap();
        let fired = store.evaluate_alerts("AAPL", &update.current);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, AlertKind::PriceAbove);
        assert!(fired[0].fired);

        let update = store.update("AAPL", dec!(130), dec!(110), Local::now()).unwrap();
        assert!(store.evaluate_alerts("AAPL", &update.current).is_empty());
        assert!(store.get("AAPL").unwrap().alert(AlertKind::PriceAbove).unwrap().fired);
        assert!(!store.get("AAPL").unwrap().alert(AlertKind::PriceBelow).unwrap().fired);
    }

    #[test]
    fn test_set_alert_fires_on_current_observation() {
        let mut store = store_with(&["AAPL"]);
        let update = store.update("AAPL", dec!(150), dec!(145), Local::now()).unwrap();
        assert_eq!(update.current.percent_change.unwrap().round_dp(2), dec!(3.45));

        let fired = store.set_alert("aapl", AlertKind::PriceAbove, dec!(150)).unwrap();
        let alert = fired.expect("boundary price should fire immediately");
        assert!(alert.fired);

        // Consumed: further ticks do not fire it again.
        let update = store.update("AAPL", dec!(151), dec!(145), Local::now()).unwrap();
        assert!(store.evaluate_alerts("AAPL", &update.current).is_empty());
    }

    #[test]
    fn test_set_alert_replaces_and_rearms() {
        let mut store = store_with(&["AAPL"]);
        store.update("AAPL", dec!(150), dec!(145), Local::now()).unwrap();
        assert!(store.set_alert("AAPL", AlertKind::PriceAbove, dec!(140)).unwrap().is_some());

        assert!(store.set_alert("AAPL", AlertKind::PriceAbove, dec!(160)).unwrap().is_none());
        let alert = store.get("AAPL").unwrap().alert(AlertKind::PriceAbove).unwrap();
        assert_eq!(alert.threshold, dec!(160));
        assert!(!alert.fired);
        assert_eq!(store.alerts().count(), 1);
    }

    #[test]
    fn test_set_alert_rejects_invalid_input() {
        let mut store = store_with(&["AAPL"]);

        assert!(matches!(
            store.set_alert("MSFT", AlertKind::PriceAbove, dec!(1)),
            Err(StockWatchError::NotTracked(_))
        ));
        assert!(matches!(
            store.set_alert("AAPL", AlertKind::PriceBelow, dec!(-5)),
            Err(StockWatchError::InvalidThreshold(_))
        ));
        assert_eq!(store.alerts().count(), 0);
    }

    #[test]
    fn test_delete_alert() {
        let mut store = store_with(&["AAPL"]);
        store.set_alert("AAPL", AlertKind::PctBelow, dec!(-2)).unwrap();

        let removed = store.delete_alert("AAPL", AlertKind::PctBelow).unwrap();
        assert_eq!(removed.threshold, dec!(-2));
        assert!(matches!(
            store.delete_alert("AAPL", AlertKind::PctBelow),
            Err(StockWatchError::AlertNotFound { .. })
        ));
    }

    #[test]
    fn test_untrack_removes_alerts() {
        let mut store = store_with(&["AAPL", "MSFT"]);
        store.set_alert("AAPL", AlertKind::PriceAbove, dec!(200)).unwrap();
        store.set_alert("AAPL", AlertKind::PctAbove, dec!(5)).unwrap();
        store.set_alert("MSFT", AlertKind::PriceBelow, dec!(300)).unwrap();

        let removed = store.untrack("aapl").unwrap();
        assert_eq!(removed.alerts().count(), 2);
        assert!(store.alerts().all(|a| a.symbol == "MSFT"));

        // Re-tracking starts with a clean slate.
        store.track("AAPL").unwrap();
        assert_eq!(store.get("AAPL").unwrap().alerts().count(), 0);
        assert!(matches!(store.untrack("TSLA"), Err(StockWatchError::NotTracked(_))));
    }

    #[test]
    fn test_history_is_capped() {
        let mut store = ObservationStore::new(3);
        store.track("AAPL").unwrap();
        for i in 1..=5 {
            store
                .update("AAPL", Decimal::from(i), dec!(1), Local::now())
                .unwrap();
        }

        let prices: Vec<Decimal> = store.history().iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![dec!(3), dec!(4), dec!(5)]);

        store.clear_history();
        assert!(store.history().is_empty());
        assert!(store.get("AAPL").unwrap().observation.is_some());
    }
}
