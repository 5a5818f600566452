pub mod spark;

pub use spark::{YahooClient, YAHOO_SPARK_URL};
