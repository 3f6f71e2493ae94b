use statwatch::types::Zoom;
use statwatch::ws::AgentClient;

// Integration probe: only runs when STATWATCH_WS is set to an agent WebSocket URL.
// Example: STATWATCH_WS=ws://127.0.0.1:3000/ws cargo test -p statwatch --test ws_probe -- --nocapture
#[tokio::test]
async fn probe_ws_endpoints() {
    let url = match std::env::var("STATWATCH_WS") {
        Ok(v) if !v.is_empty() => v,
        _ => {
            eprintln!("skipping ws_probe: set STATWATCH_WS=ws://host:port/ws to run this integration test");
            return;
        }
    };

    let client = AgentClient::connect(&url).await.expect("connect ws");

    let first = client.stats(Zoom::Minute, None).await.expect("stats");
    assert!(!first.stats.is_empty(), "expected at least one stats block");
    assert!(first.stats.contains_key(&first.main_stats_block));

    // Asking from the newest sample returns a window starting at that sample
    let delta = client
        .stats(Zoom::Minute, Some(first.last_tstamp))
        .await
        .expect("stats delta");
    let block = &delta.stats[&delta.main_stats_block];
    assert_eq!(block.timestamp.first(), Some(&first.last_tstamp));

    let tasks = client.tasks(None).await.expect("tasks");
    assert!(!tasks.etag.is_empty());
}
