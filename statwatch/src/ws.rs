//! Minimal WebSocket client helpers for requesting stats and tasks from the agent.

use std::sync::{Arc, Mutex as SyncMutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::types::{Request, StatsResponse, TasksResponse, Zoom};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Connect to the agent and return the WS stream
pub async fn connect(url: &str) -> Result<WsStream> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(Error::InvalidUrl {
            url: url.to_string(),
            reason: "scheme must be ws or wss".into(),
        });
    }
    let (ws, _) = connect_async(url).await?;
    debug!(%url, "connected to agent");
    Ok(ws)
}

// Send one JSON request and await the single JSON reply
async fn round_trip<R: DeserializeOwned>(ws: &mut WsStream, req: &Request) -> Result<R> {
    let body = serde_json::to_string(req)?;
    ws.send(Message::Text(body)).await?;
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(json))) => return decode_reply(&json),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return Err(Error::Closed),
            Some(Ok(other)) => return Err(Error::UnexpectedFrame(format!("{other:?}"))),
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

// Agent replies to a request it cannot serve with `{"error": "..."}`
fn decode_reply<R: DeserializeOwned>(json: &str) -> Result<R> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if let Some(reason) = value.get("error") {
        let reason = reason.as_str().map_or_else(|| reason.to_string(), str::to_string);
        return Err(Error::Rejected(reason));
    }
    Ok(serde_json::from_value(value)?)
}

pub async fn request_stats(
    ws: &mut WsStream,
    zoom: Zoom,
    have_tstamp: Option<i64>,
) -> Result<StatsResponse> {
    round_trip(ws, &Request::Stats { zoom, have_tstamp }).await
}

// Blocks on the agent side until the task list differs from `etag`
pub async fn request_tasks(ws: &mut WsStream, etag: Option<String>) -> Result<TasksResponse> {
    round_trip(ws, &Request::Tasks { etag }).await
}

type SharedSocket = Arc<Mutex<WsStream>>;

/// Shareable connection. Requests are serialized on the socket, so a request
/// issued while an older one is outstanding waits for the older reply first.
#[derive(Clone)]
pub struct AgentClient {
    url: Arc<str>,
    socket: Arc<SyncMutex<SharedSocket>>,
}

impl AgentClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let ws = connect(url).await?;
        Ok(Self {
            url: url.into(),
            socket: Arc::new(SyncMutex::new(Arc::new(Mutex::new(ws)))),
        })
    }

    fn current(&self) -> SharedSocket {
        self.socket.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Move later requests to a new socket if one is still outstanding on
    /// the current one. The old socket closes once that request ends.
    pub async fn reconnect_if_busy(&self) -> Result<bool> {
        let busy = self.current().try_lock().is_err();
        if !busy {
            return Ok(false);
        }
        let fresh = Arc::new(Mutex::new(connect(&self.url).await?));
        *self.socket.lock().unwrap_or_else(PoisonError::into_inner) = fresh;
        debug!(url = %self.url, "replaced busy agent socket");
        Ok(true)
    }

    pub async fn stats(&self, zoom: Zoom, have_tstamp: Option<i64>) -> Result<StatsResponse> {
        let socket = self.current();
        let mut ws = socket.lock().await;
        request_stats(&mut ws, zoom, have_tstamp).await
    }

    pub async fn tasks(&self, etag: Option<String>) -> Result<TasksResponse> {
        let socket = self.current();
        let mut ws = socket.lock().await;
        request_tasks(&mut ws, etag).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_reply_fails_the_request() {
        let err = decode_reply::<TasksResponse>(r#"{"error":"malformed request: unknown variant `week`"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Rejected(ref r) if r.contains("week")), "{err}");
    }

    #[test]
    fn regular_reply_decodes() {
        let tasks: TasksResponse = decode_reply(r#"{"etag":"3","tasks":[]}"#).unwrap();
        assert_eq!(tasks.etag, "3");
        assert!(decode_reply::<TasksResponse>("[1,2]").is_err());
    }
}
