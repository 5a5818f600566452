#[cfg(test)]
pub mod fake;
pub mod poller;
pub mod yahoo;

use std::collections::{BTreeSet, HashMap};
use std::future::Future;

use rust_decimal::Decimal;

use crate::error::Result;

/// Latest price and the reference close it is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub price: Decimal,
    pub prior_close: Decimal,
}

/// Quotes keyed by upper-case symbol. Symbols the provider had no data for are absent.
pub type QuoteBatch = HashMap<String, Quote>;

/// A source of quotes that answers for many symbols in a single request.
pub trait QuoteProvider: Send + Sync + 'static {
    fn fetch(&self, symbols: &BTreeSet<String>) -> impl Future<Output = Result<QuoteBatch>> + Send;
}
