use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

use super::{Connector, TransportCommand, TransportEvent, TransportLink, TransportPeer};
use crate::config::SessionConfig;
use crate::error::{ParleyError, Result};

/// Connects to a live model endpoint over a WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    api_key: Option<String>,
    setup: Option<serde_json::Value>,
    buffer: usize,
}

impl WsConnector {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            setup: config.setup.clone(),
            buffer: config.send_buffer,
        }
    }
}

impl Connector for WsConnector {
    async fn connect(&self) -> Result<TransportLink> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ParleyError::Acquisition(format!("invalid session url '{}': {e}", self.url)))?;

        if let Some(key) = self.api_key.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| ParleyError::Config(format!("invalid api key header: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (mut ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ParleyError::Acquisition(format!("failed to connect to {}: {e}", self.url)))?;

        if let Some(setup) = &self.setup {
            ws.send(Message::Text(setup.to_string()))
                .await
                .map_err(|e| ParleyError::Acquisition(format!("failed to send setup message: {e}")))?;
        }

        tracing::info!("connected to {}", self.url);

        let (link, peer) = TransportLink::pair(self.buffer.max(1));
        tokio::spawn(drive(ws, peer));
        Ok(link)
    }
}

/// Pump frames between the socket and the link until either side closes.
async fn drive<S>(ws: WebSocketStream<S>, peer: TransportPeer)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let TransportPeer {
        mut commands,
        events,
    } = peer;
    let (mut write, mut read) = ws.split();

    if events.send(TransportEvent::Open).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(TransportCommand::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        let _ = events.send(TransportEvent::Error(format!("send failed: {e}"))).await;
                        break;
                    }
                }
                Some(TransportCommand::Close) | None => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!("close frame not sent: {e}");
                    }
                    tracing::debug!("websocket closed locally");
                    break;
                }
            },
            frame = read.next() => {
                let event = match frame {
                    Some(Ok(Message::Text(text))) => TransportEvent::Message(text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(_) => {
                            tracing::warn!("ignoring non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        let _ = events.send(TransportEvent::Closed(reason)).await;
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = events.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Closed(None)).await;
                        break;
                    }
                };

                if events.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
}
