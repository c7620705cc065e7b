use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use log::{debug, info, warn};

use crate::data::{PriceUpdate, SymbolQuote};

/// Largest move, in either direction, applied on a single tick.
pub const MAX_TICK_MOVE: f64 = 5.0;

/// Random walk step. There is no floor, so prices may go negative.
pub fn next_price(current: f64) -> f64 {
    current + rand::thread_rng().gen_range(-MAX_TICK_MOVE..=MAX_TICK_MOVE)
}

/// Owns the tracked quotes and ticks each one on its own timer.
pub struct PriceGenerator {
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PriceGenerator {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns one tick loop per quote and returns how many were started.
    ///
    /// The channel is bounded: a full channel blocks the sending symbol's loop
    /// until the hub catches up.
    pub fn start(&self, quotes: Vec<SymbolQuote>, events: mpsc::Sender<PriceUpdate>) -> usize {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        let count = quotes.len();

        for quote in quotes {
            let events = events.clone();
            let shutdown = self.shutdown.clone();
            handles.push(tokio::spawn(run_symbol(quote, events, shutdown)));
        }

        info!("🚀 Started price updates for {} symbols", count);
        count
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Waits for every tick loop to exit.
    pub async fn join(&self) {
        let handles: Vec<JoinHandle<()>> = self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Price update task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_symbol(mut quote: SymbolQuote, events: mpsc::Sender<PriceUpdate>, shutdown: CancellationToken) {
    let period = Duration::from_secs(quote.refresh_interval_secs);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Starting price updates for {} every {}s", quote.symbol, quote.refresh_interval_secs);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        quote.current_price = next_price(quote.current_price);
        debug!("{} ticked to {:.2}", quote.symbol, quote.current_price);

        tokio::select! {
            _ = shutdown.cancelled() => break,
            sent = events.send(quote.clone()) => {
                if sent.is_err() {
                    warn!("Event channel closed, stopping price updates for {}", quote.symbol);
                    return;
                }
            }
        }
    }

    info!("Stopped price updates for {}", quote.symbol);
}
