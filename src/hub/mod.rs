pub mod sink;
pub mod registry;
pub mod broadcast;

pub use sink::SubscriberSink;
pub use registry::{Subscriber, SubscriberId, SubscriberRegistry, SubscriberState};
pub use broadcast::{BroadcastHub, FanOut};
