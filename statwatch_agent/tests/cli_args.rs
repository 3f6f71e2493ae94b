//! CLI and end-to-end tests for statwatch_agent (server)
use std::process::{Child, Command};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

struct Agent(Child);

impl Drop for Agent {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_agent(args: &[&str], envs: &[(&str, &str)]) -> Agent {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_statwatch_agent"));
    cmd.args(args).env("STATWATCH_AGENT_INTERVAL_MS", "100");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    Agent(cmd.spawn().expect("spawn agent"))
}

async fn connect_retry(
    url: &str,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    tokio_tungstenite::tungstenite::Error,
> {
    let mut last = None;
    for _ in 0..50 {
        match connect_async(url).await {
            Ok((ws, _)) => return Ok(ws),
            Err(e) => last = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(last.expect("at least one attempt"))
}

#[test]
fn help_lists_port_flags() {
    let out = assert_cmd::Command::cargo_bin("statwatch_agent")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("--port") && text.contains("-p"), "{text}");
    assert!(text.contains("STATWATCH_AGENT_INTERVAL_MS"), "{text}");
}

#[tokio::test]
async fn serves_stats_and_tasks_on_short_port_flag() {
    let _agent = spawn_agent(&["-p", "9557"], &[]);
    let mut ws = connect_retry("ws://127.0.0.1:9557/ws").await.expect("connect");

    // Let a few samples land
    tokio::time::sleep(Duration::from_millis(400)).await;
    ws.send(Message::Text(r#"{"op":"stats","zoom":"minute","have_tstamp":null}"#.into()))
        .await
        .unwrap();
    let reply = loop {
        match ws.next().await.expect("reply").unwrap() {
            Message::Text(t) => break t,
            _ => continue,
        }
    };
    let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(v["main_stats_block"], "cpu");
    assert!(v["stats"]["cpu"]["timestamp"].as_array().is_some_and(|a| !a.is_empty()));

    ws.send(Message::Text(r#"{"op":"tasks","etag":null}"#.into()))
        .await
        .unwrap();
    let reply = loop {
        match ws.next().await.expect("reply").unwrap() {
            Message::Text(t) => break t,
            _ => continue,
        }
    };
    let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert!(v["etag"].is_string());
    assert!(v["tasks"].is_array());
}

#[tokio::test]
async fn bad_request_is_answered_and_socket_stays_usable() {
    let _agent = spawn_agent(&["--port", "9559"], &[]);
    let mut ws = connect_retry("ws://127.0.0.1:9559/ws").await.expect("connect");

    ws.send(Message::Text(r#"{"op":"stats","zoom":"week"}"#.into()))
        .await
        .unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await.expect("reply").unwrap() {
                Message::Text(t) => break t,
                _ => continue,
            }
        }
    })
    .await
    .expect("agent answered the bad request");
    let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert!(v["error"].is_string(), "{reply}");

    ws.send(Message::Text(r#"{"op":"stats","zoom":"minute"}"#.into()))
        .await
        .unwrap();
    let reply = loop {
        match ws.next().await.expect("reply").unwrap() {
            Message::Text(t) => break t,
            _ => continue,
        }
    };
    let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(v["main_stats_block"], "cpu");
}

#[tokio::test]
async fn token_is_required_when_configured() {
    let _agent = spawn_agent(&["--port", "9558"], &[("STATWATCH_AGENT_TOKEN", "s3cret")]);
    // Wait until the listener is up, using the right token
    connect_retry("ws://127.0.0.1:9558/ws?token=s3cret")
        .await
        .expect("connect with token");
    assert!(connect_async("ws://127.0.0.1:9558/ws").await.is_err());
    assert!(connect_async("ws://127.0.0.1:9558/ws?token=nope").await.is_err());
}
