use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use log::debug;

use crate::error::StreamResult;
use crate::hub::SubscriberSink;

pub type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Write half of an upgraded connection, registered with the hub.
///
/// `disconnected` is cancelled when the sink is closed or dropped, which
/// tells the connection task to release the read half and the socket.
pub struct WebSocketSink {
    peer_addr: String,
    write: Mutex<WsWriter>,
    disconnected: CancellationToken,
}

impl WebSocketSink {
    pub fn new(peer_addr: String, write: WsWriter, disconnected: CancellationToken) -> Self {
        Self {
            peer_addr,
            write: Mutex::new(write),
            disconnected,
        }
    }
}

#[async_trait]
impl SubscriberSink for WebSocketSink {
    async fn deliver(&self, payload: &str) -> StreamResult<()> {
        let mut write = self.write.lock().await;
        write.send(Message::Text(payload.to_string())).await?;
        Ok(())
    }

    async fn close(&self) {
        // Cancel before the handshake, which stalls on a peer that stopped reading.
        self.disconnected.cancel();
        let mut write = self.write.lock().await;
        if let Err(e) = write.close().await {
            debug!("Close handshake with {} failed: {:?}", self.peer_addr, e);
        }
    }
}

impl Drop for WebSocketSink {
    fn drop(&mut self) {
        self.disconnected.cancel();
    }
}
