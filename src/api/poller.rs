use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::api::{QuoteBatch, QuoteProvider};

/// Outcome of one poll cycle, delivered to the foreground for applying.
#[derive(Debug, Clone)]
pub enum PollEvent {
    Quotes {
        fetched_at: DateTime<Local>,
        requested: BTreeSet<String>,
        quotes: QuoteBatch,
    },
    Failed {
        at: DateTime<Local>,
        error: String,
    },
}

/// Fetch quotes for the currently tracked symbols every `interval`.
///
/// The tracked set is read from `symbols` at the start of each cycle. While it is
/// empty the loop waits for it to change instead of ticking. A fetch always finishes
/// before the next one starts; ticks missed during a slow fetch are delayed, not
/// replayed. Returns once the event receiver or the symbol publisher is dropped.
pub async fn run_poller<P: QuoteProvider>(
    provider: P,
    mut symbols: watch::Receiver<BTreeSet<String>>,
    sender: mpsc::Sender<PollEvent>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Polling loop started (every {:?})", interval);

    loop {
        let requested = symbols.borrow_and_update().clone();

        if requested.is_empty() {
            debug!("No symbols tracked; poller idle");
            tokio::select! {
                changed = symbols.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = sender.closed() => break,
            }
        }

        tokio::select! {
            _ = ticker.tick() => {}
            _ = sender.closed() => break,
        }

        // The set may have shrunk while waiting for the tick.
        let requested = symbols.borrow_and_update().clone();
        if requested.is_empty() {
            continue;
        }

        debug!("Fetching quotes for {} symbol(s)", requested.len());
        let event = match provider.fetch(&requested).await {
            Ok(quotes) => PollEvent::Quotes {
                fetched_at: Local::now(),
                requested,
                quotes,
            },
            Err(e) => {
                error!("Quote fetch failed: {}", e);
                PollEvent::Failed {
                    at: Local::now(),
                    error: e.to_string(),
                }
            }
        };

        if sender.send(event).await.is_err() {
            break;
        }
    }

    info!("Polling loop stopped");
}
