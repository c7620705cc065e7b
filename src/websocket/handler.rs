use std::sync::Arc;
use futures::stream::SplitStream;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response, ErrorResponse};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use log::{debug, error, info, warn};

use crate::hub::BroadcastHub;
use crate::websocket::WebSocketSink;

pub const STREAM_PATHS: [&str; 2] = ["/ws", "/api/ws"];

pub struct WebSocketHandler {
    hub: Arc<BroadcastHub>,
    peer_addr: String,
}

impl WebSocketHandler {
    pub fn new(hub: Arc<BroadcastHub>, peer_addr: String) -> Self {
        Self {
            hub,
            peer_addr,
        }
    }

    /// Upgrades the connection, registers it with the hub and holds it open
    /// until the client goes away, the hub evicts it, or the server shuts down.
    pub async fn handle_connection(self, stream: TcpStream, shutdown: CancellationToken) {
        let ws_stream = match accept_hdr_async(stream, |req: &Request, response: Response| {
            self.route_request(req, response)
        }).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("WebSocket handshake failed for {}: {:?}", self.peer_addr, e);
                return;
            }
        };

        let (write, read) = ws_stream.split();
        let disconnected = CancellationToken::new();
        let sink = WebSocketSink::new(self.peer_addr.clone(), write, disconnected.clone());
        let id = self.hub.register(Arc::new(sink));
        info!("WebSocket subscriber {} connected from {}", id, self.peer_addr);

        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Shutdown while {} was connected", id);
            }
            _ = disconnected.cancelled() => {
                debug!("Subscriber {} was evicted by the hub", id);
            }
            _ = self.drain_client_frames(read) => {}
        }

        self.hub.unregister(id);
        info!(
            "WebSocket subscriber {} disconnected from {} ({:?})",
            id,
            self.peer_addr,
            self.hub.state(id)
        );
    }

    fn route_request(&self, req: &Request, response: Response) -> Result<Response, ErrorResponse> {
        let path = req.uri().path();
        info!("WebSocket connection request for path: {} from {}", path, self.peer_addr);

        if STREAM_PATHS.contains(&path) {
            Ok(response)
        } else {
            warn!("Unknown WebSocket path '{}' from {}", path, self.peer_addr);
            Err(create_error_response(StatusCode::NOT_FOUND, "Invalid WebSocket path"))
        }
    }

    /// The stream is server-to-client only; client frames are read and dropped.
    async fn drain_client_frames(&self, mut read: SplitStream<WebSocketStream<TcpStream>>) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Close(close_frame)) => {
                    info!("Received close frame from {}: {:?}", self.peer_addr, close_frame);
                    break;
                }
                Ok(msg) => {
                    debug!("Ignoring {} byte client frame from {}", msg.len(), self.peer_addr);
                }
                Err(e) => {
                    warn!("Error reading from {}: {:?}", self.peer_addr, e);
                    break;
                }
            }
        }
    }
}

fn create_error_response(status: StatusCode, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = status;
    response
}
