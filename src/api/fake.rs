use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rust_decimal_macros::dec;

use crate::api::{Quote, QuoteBatch, QuoteProvider};
use crate::error::{Result, StockWatchError};

/// Answers every symbol with 150 / 145, except the ones marked unknown.
#[derive(Clone)]
pub struct FakeProvider {
    pub calls: Arc<AtomicUsize>,
    fail_first: bool,
    unknown: BTreeSet<String>,
}

impl FakeProvider {
    pub fn new(fail_first: bool) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_first,
            unknown: BTreeSet::new(),
        }
    }

    pub fn with_unknown(mut self, symbols: &[&str]) -> Self {
        self.unknown = symbols.iter().map(|s| s.to_string()).collect();
        self
    }
}

impl QuoteProvider for FakeProvider {
    async fn fetch(&self, symbols: &BTreeSet<String>) -> Result<QuoteBatch> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_first && call == 0 {
            return Err(StockWatchError::ProviderError("network down".to_string()));
        }
        Ok(symbols
            .iter()
            .filter(|s| !self.unknown.contains(*s))
            .map(|s| {
                (
                    s.clone(),
                    Quote {
                        price: dec!(150),
                        prior_close: dec!(145),
                    },
                )
            })
            .collect())
    }
}
