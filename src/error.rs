use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("delivery timed out after {0:?}")]
    DeliveryTimeout(Duration),

    #[error("invalid quote: {0}")]
    InvalidQuote(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

pub type StreamResult<T> = Result<T, StreamError>;

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}
