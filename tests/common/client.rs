//! Test WebSocket client.
//!
//! Connects the way the browser frontend does: the token travels as the
//! offered subprotocol.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test WebSocket client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect to `url` offering `token` as the subprotocol.
    pub async fn connect(url: &str, token: &str) -> anyhow::Result<Self> {
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_str(token)?);
        let (ws, _response) = connect_async(request).await?;
        Ok(Self { ws })
    }

    /// Open the user's notification stream.
    pub async fn notify(base: &str, token: &str) -> anyhow::Result<Self> {
        Self::connect(&format!("{base}/ws/notify"), token).await
    }

    /// Open a stream subscribed to `room_id`.
    pub async fn room(base: &str, room_id: i64, token: &str) -> anyhow::Result<Self> {
        Self::connect(&format!("{base}/ws?roomId={room_id}"), token).await
    }

    /// HTTP status of a refused upgrade, or `None` if it was accepted.
    pub async fn rejection_status(url: &str, token: &str) -> Option<u16> {
        match Self::connect(url, token).await {
            Ok(_) => None,
            Err(e) => match e.downcast_ref::<tokio_tungstenite::tungstenite::Error>() {
                Some(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                    Some(response.status().as_u16())
                }
                _ => Some(0),
            },
        }
    }

    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn send_json(&mut self, value: &Value) -> anyhow::Result<()> {
        self.send_raw(&value.to_string()).await
    }

    /// Receive the next text unit as JSON.
    pub async fn recv(&mut self) -> anyhow::Result<Value> {
        self.recv_timeout(Duration::from_secs(3)).await
    }

    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Value> {
        loop {
            let frame = timeout(dur, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("stream ended"))??;
            match frame {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(frame) => anyhow::bail!("closed by server: {frame:?}"),
                _ => continue,
            }
        }
    }

    /// Receive units until one satisfies `predicate`.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Value>
    where
        F: FnMut(&Value) -> bool,
    {
        loop {
            let value = self.recv().await?;
            if predicate(&value) {
                return Ok(value);
            }
        }
    }

    /// True if no text unit arrives within `dur`.
    pub async fn is_silent_for(&mut self, dur: Duration) -> bool {
        self.recv_timeout(dur).await.is_err()
    }

    /// Wait for the server to close the stream.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        loop {
            match timeout(Duration::from_secs(3), self.ws.next()).await? {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => return Ok(()),
                Some(Ok(_)) => continue,
            }
        }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
