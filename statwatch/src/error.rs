//! Transport errors surfaced by the agent client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("agent closed the connection")]
    Closed,
    #[error("unexpected frame from agent: {0}")]
    UnexpectedFrame(String),
    #[error("agent rejected the request: {0}")]
    Rejected(String),
    #[error("malformed agent reply: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid agent url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
