//! Websocket push loop against an in-process router.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use hostdash_agent::{
    api,
    config::Config,
    error::AdapterError,
    exec::{CommandOutput, CommandRunner},
    state::AppState,
};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};

struct PsOnly;

#[async_trait]
impl CommandRunner for PsOnly {
    async fn run(&self, program: &str, _args: &[String]) -> Result<CommandOutput, AdapterError> {
        if program != "ps" {
            return Err(AdapterError::Spawn {
                program: program.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Ok(CommandOutput {
            stdout: "7 root 1.0 0.5 S 10:00 sshd: listener\n".to_string(),
            stderr: String::new(),
        })
    }
}

async fn serve() -> (String, AppState) {
    let env = [
        ("HOSTDASH_ADMIN_PASSWORD", "pw"),
        ("HOSTDASH_API_TOKEN", "tok"),
        ("HOSTDASH_ENABLE_DOCKER", "0"),
        ("HOSTDASH_POLL_MS", "250"),
        ("HOSTDASH_NET_DEV", "/nonexistent/hostdash/net/dev"),
    ];
    let cfg = Config::from_sources(vec!["hostdash_agent".to_string()], |k| {
        env.iter().find(|(n, _)| *n == k).map(|(_, v)| v.to_string())
    })
    .expect("config");
    let state = AppState::with_runner(&cfg, Arc::new(PsOnly)).expect("state");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = api::router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("ws://{addr}/ws"), state)
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("snapshot within timeout")
            .expect("stream open")
            .expect("ws frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("snapshot json");
        }
    }
}

#[tokio::test]
async fn rejects_unauthenticated_upgrade() {
    let (url, _state) = serve().await;
    assert!(connect_async(url.as_str()).await.is_err());
}

#[tokio::test]
async fn pushes_snapshots_and_tracks_clients() {
    let (url, state) = serve().await;
    let (mut ws, _) = connect_async(format!("{url}?token=tok"))
        .await
        .expect("ws connect");

    let snap = next_json(&mut ws).await;
    assert!(snap["ts_unix_ms"].as_i64().unwrap() > 0);
    assert_eq!(snap["processes"][0]["pid"], 7);
    assert!(snap["containers"].is_null());
    // pm2 fails in this runner; the failure is reported, not fatal
    assert!(snap["pm2"].is_null());
    assert!(!snap["errors"].as_array().unwrap().is_empty());
    assert_eq!(state.client_count.load(Ordering::Relaxed), 1);

    ws.send(Message::Text("refresh".into())).await.unwrap();
    let again = next_json(&mut ws).await;
    assert!(again["metrics"]["mem"].is_object());

    ws.close(None).await.unwrap();
    for _ in 0..50 {
        if state.client_count.load(Ordering::Relaxed) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state.client_count.load(Ordering::Relaxed), 0);
}
