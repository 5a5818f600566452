use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use rust_decimal::Decimal;

use crate::error::{Result, StockWatchError};
use crate::monitor::store::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlertKind {
    PriceAbove,
    PriceBelow,
    PctAbove,
    PctBelow,
}

impl AlertKind {
    pub const ALL: [AlertKind; 4] = [
        AlertKind::PriceAbove,
        AlertKind::PriceBelow,
        AlertKind::PctAbove,
        AlertKind::PctBelow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::PriceAbove => "price-above",
            AlertKind::PriceBelow => "price-below",
            AlertKind::PctAbove => "pct-above",
            AlertKind::PctBelow => "pct-below",
        }
    }

    /// Short operator form used in tables, e.g. `>=` or `%<=`.
    pub fn operator(&self) -> &'static str {
        match self {
            AlertKind::PriceAbove => ">=",
            AlertKind::PriceBelow => "<=",
            AlertKind::PctAbove => "%>=",
            AlertKind::PctBelow => "%<=",
        }
    }

    pub fn is_percent(&self) -> bool {
        matches!(self, AlertKind::PctAbove | AlertKind::PctBelow)
    }

    /// Reject thresholds that can never be meaningful for this kind.
    pub fn validate_threshold(&self, threshold: Decimal) -> Result<()> {
        if !self.is_percent() && threshold <= Decimal::ZERO {
            return Err(StockWatchError::InvalidThreshold(format!(
                "{} threshold must be positive, got {}",
                self, threshold
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = StockWatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "price-above" | "above" | ">" | ">=" => Ok(AlertKind::PriceAbove),
            "price-below" | "below" | "<" | "<=" => Ok(AlertKind::PriceBelow),
            "pct-above" | "percent-above" | "%>" | "%>=" => Ok(AlertKind::PctAbove),
            "pct-below" | "percent-below" | "%<" | "%<=" => Ok(AlertKind::PctBelow),
            _ => Err(StockWatchError::UnknownAlertKind(s.to_string())),
        }
    }
}

/// One-time threshold alert. Once fired it stays dormant until replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub symbol: String,
    pub kind: AlertKind,
    pub threshold: Decimal,
    pub fired: bool,
    pub fired_at: Option<DateTime<Local>>,
}

impl Alert {
    pub fn new(symbol: impl Into<String>, kind: AlertKind, threshold: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
            threshold,
            fired: false,
            fired_at: None,
        }
    }

    /// Whether `observation` satisfies the condition. Boundary values count.
    pub fn is_met(&self, observation: &Observation) -> bool {
        match self.kind {
            AlertKind::PriceAbove => observation.price >= self.threshold,
            AlertKind::PriceBelow => observation.price <= self.threshold,
            AlertKind::PctAbove => observation
                .percent_change
                .map_or(false, |pct| pct >= self.threshold),
            AlertKind::PctBelow => observation
                .percent_change
                .map_or(false, |pct| pct <= self.threshold),
        }
    }

    /// Fire if armed and met. Returns true only on the false -> true transition.
    pub fn try_fire(&mut self, observation: &Observation) -> bool {
        if self.fired || !self.is_met(observation) {
            return false;
        }
        self.fired = true;
        self.fired_at = Some(observation.observed_at);
        true
    }

    pub fn describe(&self) -> String {
        match self.kind {
            AlertKind::PriceAbove => format!("{} price above {}", self.symbol, self.threshold),
            AlertKind::PriceBelow => format!("{} price below {}", self.symbol, self.threshold),
            AlertKind::PctAbove => format!("{} change above {}%", self.symbol, self.threshold),
            AlertKind::PctBelow => format!("{} change below {}%", self.symbol, self.threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn observation(price: Decimal, prior_close: Decimal) -> Observation {
        Observation::new(price, prior_close, Local::now())
    }

    #[test]
    fn test_price_above_boundary() {
        let alert = Alert::new("AAPL", AlertKind::PriceAbove, dec!(100));

        assert!(alert.is_met(&observation(dec!(100.00), dec!(90))));
        assert!(alert.is_met(&observation(dec!(150.00), dec!(90))));
        assert!(!alert.is_met(&observation(dec!(99.99), dec!(90))));
    }

    #[test]
    fn test_price_below_boundary() {
        let alert = Alert::new("AAPL", AlertKind::PriceBelow, dec!(100));

        assert!(alert.is_met(&observation(dec!(100), dec!(90))));
        assert!(alert.is_met(&observation(dec!(80), dec!(90))));
        assert!(!alert.is_met(&observation(dec!(100.01), dec!(90))));
    }

    #[test]
    fn test_percent_conditions() {
        // +10% and -10% moves
        let up = observation(dec!(110), dec!(100));
        let down = observation(dec!(90), dec!(100));

        let above = Alert::new("X", AlertKind::PctAbove, dec!(10));
        let below = Alert::new("X", AlertKind::PctBelow, dec!(-10));

        assert!(above.is_met(&up));
        assert!(!above.is_met(&down));
        assert!(below.is_met(&down));
        assert!(!below.is_met(&up));
    }

    #[test]
    fn test_percent_alert_ignores_missing_change() {
        let alert = Alert::new("X", AlertKind::PctBelow, dec!(5));
        assert!(!alert.is_met(&observation(dec!(10), Decimal::ZERO)));
    }

    #[test]
    fn test_fires_at_most_once() {
        let mut alert = Alert::new("AAPL", AlertKind::PriceAbove, dec!(100));

        assert!(!alert.try_fire(&observation(dec!(99), dec!(90))));
        assert!(alert.try_fire(&observation(dec!(101), dec!(90))));
        assert!(alert.fired);
        assert!(alert.fired_at.is_some());

        // Dropping back and crossing again does not re-arm.
        assert!(!alert.try_fire(&observation(dec!(95), dec!(90))));
        assert!(!alert.try_fire(&observation(dec!(120), dec!(90))));
        assert!(alert.fired);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("price-above".parse::<AlertKind>().unwrap(), AlertKind::PriceAbove);
        assert_eq!("BELOW".parse::<AlertKind>().unwrap(), AlertKind::PriceBelow);
        assert_eq!("pct_above".parse::<AlertKind>().unwrap(), AlertKind::PctAbove);
        assert_eq!("%<=".parse::<AlertKind>().unwrap(), AlertKind::PctBelow);
        assert!(matches!(
            "sideways".parse::<AlertKind>(),
            Err(StockWatchError::UnknownAlertKind(_))
        ));

        for kind in AlertKind::ALL {
            assert_eq!(kind.as_str().parse::<AlertKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_threshold_validation() {
        assert!(AlertKind::PriceAbove.validate_threshold(dec!(0)).is_err());
        assert!(AlertKind::PriceBelow.validate_threshold(dec!(-1)).is_err());
        assert!(AlertKind::PriceBelow.validate_threshold(dec!(0.01)).is_ok());
        assert!(AlertKind::PctBelow.validate_threshold(dec!(-3.5)).is_ok());
    }
}
