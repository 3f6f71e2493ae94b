//! AgentClient against an in-process stand-in agent.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use statwatch::error::Error;
use statwatch::types::Zoom;
use statwatch::ws::AgentClient;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

// Answers tasks requests at once, except those carrying etag "hold" which are
// never answered, and rejects every stats request.
async fn stand_in_agent() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                while let Some(Ok(Message::Text(req))) = ws.next().await {
                    if req.contains(r#""hold""#) {
                        continue;
                    }
                    let reply = if req.contains(r#""stats""#) {
                        r#"{"error":"malformed request: unknown variant `week`"}"#
                    } else {
                        r#"{"etag":"1","tasks":[]}"#
                    };
                    if ws.send(Message::Text(reply.into())).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    format!("ws://{addr}/ws")
}

#[tokio::test]
async fn rejected_request_fails_instead_of_hanging() {
    let client = AgentClient::connect(&stand_in_agent().await).await.unwrap();
    let res = tokio::time::timeout(Duration::from_secs(2), client.stats(Zoom::Minute, None))
        .await
        .expect("request settles");
    assert!(matches!(res, Err(Error::Rejected(ref r)) if r.contains("week")));

    // the socket is still usable afterwards
    let tasks = client.tasks(None).await.unwrap();
    assert_eq!(tasks.etag, "1");
}

#[tokio::test]
async fn busy_socket_is_replaced_for_new_requests() {
    let client = AgentClient::connect(&stand_in_agent().await).await.unwrap();
    assert!(!client.reconnect_if_busy().await.unwrap());

    let stale = client.clone();
    let held = tokio::spawn(async move { stale.tasks(Some("hold".into())).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(client.reconnect_if_busy().await.unwrap());
    let tasks = tokio::time::timeout(Duration::from_secs(2), client.tasks(None))
        .await
        .expect("new socket is not held up")
        .unwrap();
    assert_eq!(tasks.etag, "1");
    assert!(!held.is_finished());
    held.abort();
}
