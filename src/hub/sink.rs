use async_trait::async_trait;

use crate::error::StreamResult;

/// Delivery handle for one subscriber.
///
/// `deliver` pushes one encoded update. Any error means the subscriber is
/// gone and will be evicted.
#[async_trait]
pub trait SubscriberSink: Send + Sync {
    async fn deliver(&self, payload: &str) -> StreamResult<()>;

    /// Ends the stream. Called once, after eviction or unregistration.
    async fn close(&self) {}
}
