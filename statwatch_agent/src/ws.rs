//! WebSocket upgrade and per-connection handler. Replies are built from shared state.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

use crate::state::AppState;
use crate::types::{ErrorReply, Request};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if let Some(expected) = state.auth_token.as_ref() {
        match q.get("token") {
            Some(t) if t == expected => {}
            _ => {
                warn!("rejected connection with missing or wrong token");
                return StatusCode::UNAUTHORIZED.into_response();
            }
        }
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn error_reply(error: String) -> String {
    serde_json::to_string(&ErrorReply { error })
        .unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string())
}

/// Serialized reply for one request text. Every request gets exactly one
/// reply; a malformed one gets an `{"error": ..}` object.
pub async fn respond(state: &AppState, text: &str) -> String {
    let request: Request = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!("rejecting malformed request: {e}");
            return error_reply(format!("malformed request: {e}"));
        }
    };
    let body = match request {
        Request::Stats { zoom, have_tstamp } => {
            let store = state.store.read().await;
            serde_json::to_string(&store.window(zoom, have_tstamp, &state.hostname))
        }
        Request::Tasks { etag } => {
            let tasks = state
                .tasks
                .wait_for_change(etag.as_deref(), state.long_poll)
                .await;
            serde_json::to_string(&tasks)
        }
    };
    body.unwrap_or_else(|e| {
        warn!("failed to encode reply: {e}");
        error_reply(format!("failed to encode reply: {e}"))
    })
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let clients = state.client_count.fetch_add(1, Ordering::Relaxed) + 1;
    info!(clients, "client connected");

    // Ensure we decrement on disconnect (drop).
    struct ClientGuard(AppState);
    impl Drop for ClientGuard {
        fn drop(&mut self) {
            let left = self.0.client_count.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
            info!(clients = left, "client disconnected");
        }
    }
    let _guard = ClientGuard(state.clone());

    while let Some(Ok(msg)) = socket.next().await {
        match msg {
            Message::Text(text) => {
                let reply = respond(&state, &text).await;
                if socket.send(Message::Text(reply)).await.is_err() {
                    debug!("client went away mid-reply");
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Frame;
    use crate::types::TaskInfo;
    use std::time::Duration;

    fn state() -> AppState {
        AppState::new(10, Duration::from_millis(1000), Duration::from_secs(5), None)
    }

    #[tokio::test]
    async fn stats_request_reads_the_store() {
        let st = state();
        for ts in [1000, 2000, 3000] {
            let mut f = Frame::new(ts);
            f.set("cpu", "total", Some(ts as f64 / 100.0));
            st.store.write().await.push(f);
        }
        let reply = respond(&st, r#"{"op":"stats","zoom":"minute","have_tstamp":2000}"#).await;
        let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(v["last_tstamp"], 3000);
        assert_eq!(v["main_stats_block"], "cpu");
        assert_eq!(v["stats"]["cpu"]["timestamp"], serde_json::json!([2000, 3000]));
        assert_eq!(v["stats"]["cpu"]["total"], serde_json::json!([20.0, 30.0]));
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_request_long_polls_until_timeout() {
        let st = state();
        st.tasks.publish(vec![TaskInfo {
            pid: 7,
            name: "init".into(),
            cpu_usage: 0.0,
            mem_bytes: 0,
        }]);
        let etag = st.tasks.snapshot().etag;

        let first = respond(&st, r#"{"op":"tasks","etag":null}"#).await;
        assert!(first.contains("\"init\""));

        let started = tokio::time::Instant::now();
        let req = format!(r#"{{"op":"tasks","etag":"{etag}"}}"#);
        let held = respond(&st, &req).await;
        assert!(held.contains(&etag));
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn malformed_requests_get_an_error_reply() {
        let st = state();
        for bad in ["get_metrics", r#"{"op":"reboot"}"#, r#"{"op":"stats","zoom":"week"}"#] {
            let reply = respond(&st, bad).await;
            let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
            assert!(v["error"].as_str().is_some_and(|e| e.starts_with("malformed request")), "{reply}");
        }
    }
}
