pub mod handler;
pub mod sink;

pub use handler::WebSocketHandler;
pub use sink::WebSocketSink;
