use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use log::{debug, error, info, warn};

use crate::data::{PriceUpdate, QuoteBook};
use crate::error::StreamError;
use crate::hub::{Subscriber, SubscriberId, SubscriberRegistry, SubscriberSink, SubscriberState};

/// Outcome of one fan-out round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub evicted: usize,
}

/// Fans price updates out to every registered subscriber.
///
/// Each round copies the subscriber set and releases the registry lock
/// before any I/O, so registration never waits on a slow peer. Rounds run
/// one at a time, which keeps per-subscriber delivery in emission order.
pub struct BroadcastHub {
    registry: SubscriberRegistry,
    book: QuoteBook,
    delivery_timeout: Duration,
    shutdown: CancellationToken,
}

impl BroadcastHub {
    pub fn new(book: QuoteBook, delivery_timeout: Duration, shutdown: CancellationToken) -> Self {
        Self {
            registry: SubscriberRegistry::new(),
            book,
            delivery_timeout,
            shutdown,
        }
    }

    pub fn register(&self, sink: Arc<dyn SubscriberSink>) -> SubscriberId {
        let id = self.registry.register(sink);
        info!("Subscriber {} registered ({} active)", id, self.registry.len());
        id
    }

    /// Removes the subscriber if present. Unknown or repeated ids are ignored.
    ///
    /// The sink is closed on a spawned task. Outside a tokio runtime it is
    /// only removed and dropped, never closed.
    pub fn unregister(&self, id: SubscriberId) {
        let Some(subscriber) = self.registry.remove(id) else {
            return;
        };
        let connected_for = Utc::now() - subscriber.registered_at;
        info!(
            "Subscriber {} unregistered after {}s ({} active)",
            id,
            connected_for.num_seconds(),
            self.registry.len()
        );

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let timeout = self.delivery_timeout;
            runtime.spawn(close_subscriber(subscriber, timeout));
        } else {
            debug!("No runtime to close subscriber {}, dropping its sink", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn state(&self, id: SubscriberId) -> Option<SubscriberState> {
        self.registry.state(id)
    }

    pub fn book(&self) -> &QuoteBook {
        &self.book
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Consumes updates until the channel closes or the hub is stopped.
    pub async fn run(&self, mut events: mpsc::Receiver<PriceUpdate>) {
        info!("📡 Broadcast hub running");

        loop {
            let update = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Broadcast hub stopping");
                    break;
                }
                next = events.recv() => match next {
                    Some(update) => update,
                    None => {
                        info!("Event channel closed, broadcast hub stopping");
                        break;
                    }
                }
            };

            if let Err(e) = self.book.apply(&update) {
                warn!("Failed to record {} in quote book: {}", update.symbol, e);
            }

            let fan_out = self.broadcast(&update).await;
            debug!(
                "Broadcasted {} at {:.2} to {} subscribers ({} evicted)",
                update.symbol, update.current_price, fan_out.delivered, fan_out.evicted
            );
        }

        self.close_all().await;
    }

    /// Delivers one update to a snapshot of the current subscribers.
    pub async fn broadcast(&self, update: &PriceUpdate) -> FanOut {
        let payload = match update.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize update for {}: {}", update.symbol, e);
                return FanOut::default();
            }
        };

        let targets = self.registry.snapshot();
        if targets.is_empty() {
            return FanOut::default();
        }

        let timeout = self.delivery_timeout;
        let payload = payload.as_str();
        let outcomes = join_all(targets.into_iter().map(|(id, sink)| async move {
            let outcome = match tokio::time::timeout(timeout, sink.deliver(payload)).await {
                Ok(result) => result,
                Err(_) => Err(StreamError::DeliveryTimeout(timeout)),
            };
            (id, outcome)
        }))
        .await;

        let mut fan_out = FanOut::default();
        let mut evicted = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => fan_out.delivered += 1,
                Err(e) => {
                    // Already gone if it unregistered while the round was in flight.
                    if let Some(subscriber) = self.registry.remove(id) {
                        warn!("Evicting subscriber {}: {}", id, e);
                        evicted.push(subscriber);
                    }
                }
            }
        }

        fan_out.evicted = evicted.len();
        join_all(evicted.into_iter().map(|subscriber| close_subscriber(subscriber, timeout))).await;
        fan_out
    }

    async fn close_all(&self) {
        if self.registry.is_empty() {
            return;
        }
        let ids: Vec<SubscriberId> = self.registry.snapshot().into_iter().map(|(id, _)| id).collect();
        let remaining: Vec<Subscriber> = ids.into_iter().filter_map(|id| self.registry.remove(id)).collect();
        if remaining.is_empty() {
            return;
        }

        info!("Closing {} subscribers", remaining.len());
        let timeout = self.delivery_timeout;
        join_all(remaining.into_iter().map(|subscriber| close_subscriber(subscriber, timeout))).await;
    }
}

async fn close_subscriber(subscriber: Subscriber, timeout: Duration) {
    if tokio::time::timeout(timeout, subscriber.sink.close()).await.is_err() {
        warn!("Timed out closing subscriber {}", subscriber.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PriceGenerator, SymbolQuote};
    use crate::hub::sink::testing::{RecordingSink, StalledSink};

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn aapl(price: f64) -> SymbolQuote {
        let mut quote = SymbolQuote::new("1", "AAPL", "Apple Inc.", "stocks", 150.0, 1);
        quote.current_price = price;
        quote
    }

    fn hub() -> Arc<BroadcastHub> {
        Arc::new(BroadcastHub::new(QuoteBook::new(&[aapl(150.0)]), TIMEOUT, CancellationToken::new()))
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_one_copy() {
        let hub = hub();
        let sinks: Vec<Arc<RecordingSink>> = (0..3).map(|_| Arc::new(RecordingSink::default())).collect();
        for sink in &sinks {
            hub.register(sink.clone());
        }

        let update = aapl(151.25);
        let fan_out = hub.broadcast(&update).await;

        assert_eq!(fan_out, FanOut { delivered: 3, evicted: 0 });
        for sink in &sinks {
            assert_eq!(sink.messages(), vec![update.to_json().unwrap()]);
        }
    }

    #[tokio::test]
    async fn test_no_subscribers_drops_update() {
        let hub = hub();
        assert_eq!(hub.broadcast(&aapl(149.0)).await, FanOut::default());

        let late = Arc::new(RecordingSink::default());
        hub.register(late.clone());
        assert!(late.messages().is_empty());
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_updates() {
        let hub = hub();
        let early = Arc::new(RecordingSink::default());
        hub.register(early.clone());

        hub.broadcast(&aapl(151.0)).await;
        let late = Arc::new(RecordingSink::default());
        hub.register(late.clone());
        hub.broadcast(&aapl(152.0)).await;

        assert_eq!(early.messages().len(), 2);
        assert_eq!(late.messages(), vec![aapl(152.0).to_json().unwrap()]);
    }

    #[tokio::test]
    async fn test_failed_delivery_evicts_only_that_subscriber() {
        let hub = hub();
        let healthy = Arc::new(RecordingSink::default());
        let broken = Arc::new(RecordingSink::default());
        hub.register(healthy.clone());
        let broken_id = hub.register(broken.clone());
        broken.disconnect();

        let fan_out = hub.broadcast(&aapl(151.0)).await;
        assert_eq!(fan_out, FanOut { delivered: 1, evicted: 1 });
        assert_eq!(healthy.messages().len(), 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(hub.state(broken_id), Some(SubscriberState::Evicted));
        assert!(broken.is_closed());

        // Recovery of the peer does not bring the subscriber back.
        broken.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        hub.broadcast(&aapl(152.0)).await;
        assert!(broken.messages().is_empty());
        assert_eq!(healthy.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscriber_times_out() {
        let hub = hub();
        let healthy = Arc::new(RecordingSink::default());
        hub.register(healthy.clone());
        let stalled_id = hub.register(Arc::new(StalledSink));

        let started = tokio::time::Instant::now();
        let fan_out = hub.broadcast(&aapl(151.0)).await;

        assert_eq!(fan_out, FanOut { delivered: 1, evicted: 1 });
        assert!(started.elapsed() >= TIMEOUT);
        assert!(started.elapsed() < TIMEOUT * 3);
        assert_eq!(healthy.messages().len(), 1);
        assert_eq!(hub.state(stalled_id), Some(SubscriberState::Evicted));
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent_and_closes() {
        let hub = hub();
        let sink = Arc::new(RecordingSink::default());
        let id = hub.register(sink.clone());
        let before = hub.subscriber_count();

        hub.unregister(id);
        hub.unregister(id);
        assert_eq!(hub.subscriber_count(), before - 1);

        wait_for(|| sink.is_closed()).await;
        hub.broadcast(&aapl(151.0)).await;
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_unregister_outside_runtime_drops_without_closing() {
        let hub = BroadcastHub::new(QuoteBook::default(), TIMEOUT, CancellationToken::new());
        let sink = Arc::new(RecordingSink::default());
        let id = hub.register(sink.clone());

        hub.unregister(id);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.state(id), Some(SubscriberState::Evicted));
        assert!(!sink.is_closed());
    }

    #[tokio::test]
    async fn test_run_preserves_order_and_updates_book() {
        let hub = hub();
        let sink = Arc::new(RecordingSink::default());
        hub.register(sink.clone());

        let (tx, rx) = mpsc::channel(4);
        let runner = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.run(rx).await })
        };

        let prices: Vec<f64> = (0..20).map(|i| 150.0 + i as f64).collect();
        for price in &prices {
            tx.send(aapl(*price)).await.unwrap();
        }
        drop(tx);
        runner.await.unwrap();

        let observed: Vec<f64> = sink
            .messages()
            .iter()
            .map(|raw| serde_json::from_str::<SymbolQuote>(raw).unwrap().current_price)
            .collect();
        assert_eq!(observed, prices);
        assert_eq!(hub.book().snapshot().unwrap()[0].current_price, 169.0);
        // Channel closed: remaining subscribers are closed and removed.
        assert!(sink.is_closed());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_ends_run() {
        let hub = hub();
        let sink = Arc::new(RecordingSink::default());
        hub.register(sink.clone());

        let (_tx, rx) = mpsc::channel::<PriceUpdate>(4);
        let runner = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.run(rx).await })
        };

        hub.stop();
        runner.await.unwrap();
        assert!(sink.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_subscribers_then_one_disconnects() {
        let shutdown = CancellationToken::new();
        let quote = SymbolQuote::new("1", "AAPL", "Apple Inc.", "stocks", 150.0, 1);
        let hub = Arc::new(BroadcastHub::new(QuoteBook::new(&[quote.clone()]), TIMEOUT, shutdown.child_token()));
        let generator = PriceGenerator::new(shutdown.child_token());

        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        hub.register(a.clone());
        let b_id = hub.register(b.clone());

        let (tx, rx) = mpsc::channel(8);
        generator.start(vec![quote], tx);
        let runner = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.run(rx).await })
        };

        wait_for(|| a.messages().len() == 1 && b.messages().len() == 1).await;
        for sink in [&a, &b] {
            let update: SymbolQuote = serde_json::from_str(&sink.messages()[0]).unwrap();
            assert_eq!(update.symbol, "AAPL");
            assert!((145.0..=155.0).contains(&update.current_price));
        }

        b.disconnect();
        wait_for(|| a.messages().len() == 2).await;
        assert_eq!(b.messages().len(), 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(hub.state(b_id), Some(SubscriberState::Evicted));

        shutdown.cancel();
        generator.join().await;
        runner.await.unwrap();
    }
}
