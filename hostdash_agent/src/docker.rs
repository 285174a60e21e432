//! Docker engine adapter: listing and stats over the engine's unix socket,
//! lifecycle actions through the `docker` CLI.

use std::path::PathBuf;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{info, warn};

use crate::action::{validate_target, Action, Scope};
use crate::error::AdapterError;
use crate::exec::{args, CommandRunner};
use crate::types::{round2, ActionOutcome, ContainerRecord, ContainerStats};

// ---------- Engine JSON ----------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineContainer {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
    #[serde(default)]
    pub percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    #[serde(default)]
    pub system_cpu_usage: Option<u64>,
    #[serde(default)]
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// One-shot stats document: `cpu_stats` is sample T, `precpu_stats` is T-1.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineStats {
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub precpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
}

// ---------- Derivation ----------

pub fn cpu_percent(cpu_delta: f64, system_delta: f64, cores: u32) -> f64 {
    if system_delta <= 0.0 {
        return 0.0;
    }
    round2(cpu_delta / system_delta * f64::from(cores.max(1)) * 100.0)
}

/// Percentage of the limit in use. A missing or zero limit is taken as 1 byte,
/// which yields a meaningless but finite figure.
pub fn mem_percent(usage: u64, limit: Option<u64>) -> f64 {
    let limit = match limit {
        Some(l) if l > 0 => l,
        _ => 1,
    };
    round2(usage as f64 / limit as f64 * 100.0)
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / 1024.0 / 1024.0)
}

impl EngineStats {
    fn cores(&self) -> u32 {
        let percpu = self
            .cpu_stats
            .cpu_usage
            .percpu_usage
            .as_ref()
            .map(|v| v.len() as u32)
            .unwrap_or(0);
        if percpu > 0 {
            percpu
        } else {
            self.cpu_stats.online_cpus.unwrap_or(1).max(1)
        }
    }

    pub fn derive(&self) -> ContainerStats {
        let cpu_delta = self.cpu_stats.cpu_usage.total_usage as f64
            - self.precpu_stats.cpu_usage.total_usage as f64;
        let system_delta = self.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
            - self.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;
        let usage = self.memory_stats.usage.unwrap_or(0);
        ContainerStats {
            cpu_percent: cpu_percent(cpu_delta, system_delta, self.cores()),
            mem_used_mb: bytes_to_mb(usage),
            mem_percent: mem_percent(usage, self.memory_stats.limit),
        }
    }
}

// ---------- Engine client ----------

/// Minimal HTTP/1.0 client for the engine API over its unix socket.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    socket_path: PathBuf,
}

impl DockerEngine {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    async fn get(&self, path: &str) -> Result<String, AdapterError> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            AdapterError::Docker(format!(
                "connect {}: {e}",
                self.socket_path.display()
            ))
        })?;
        // No half-close: the engine treats client EOF as a cancelled request.
        // HTTP/1.0 means it closes once the response is written.
        let request = format!("GET {path} HTTP/1.0\r\nHost: localhost\r\n\r\n");
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| AdapterError::Docker(format!("write request: {e}")))?;

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .await
            .map_err(|e| AdapterError::Docker(format!("read response: {e}")))?;
        split_http_response(&String::from_utf8_lossy(&response))
    }

    pub async fn list_containers(&self) -> Result<Vec<EngineContainer>, AdapterError> {
        let body = self.get("/containers/json?all=1").await?;
        serde_json::from_str(&body)
            .map_err(|e| AdapterError::Parse(format!("container list: {e}")))
    }

    pub async fn container_stats(&self, id: &str) -> Result<ContainerStats, AdapterError> {
        validate_target(Scope::Docker, id)?;
        let body = self
            .get(&format!("/containers/{id}/stats?stream=false"))
            .await?;
        let raw: EngineStats = serde_json::from_str(&body)
            .map_err(|e| AdapterError::Parse(format!("stats for {id}: {e}")))?;
        Ok(raw.derive())
    }
}

/// Status line check + body extraction.
fn split_http_response(resp: &str) -> Result<String, AdapterError> {
    let (head, body) = resp
        .split_once("\r\n\r\n")
        .ok_or_else(|| AdapterError::Docker("invalid HTTP response".into()))?;
    let code = head
        .lines()
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| AdapterError::Docker("missing status line".into()))?;
    match code {
        200..=299 => Ok(body.to_string()),
        404 => Err(AdapterError::NotFound(engine_message(body))),
        _ => Err(AdapterError::Docker(format!(
            "HTTP {code}: {}",
            engine_message(body)
        ))),
    }
}

fn engine_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Msg {
        message: String,
    }
    serde_json::from_str::<Msg>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Listing plus stats for running containers. A container whose stats call
/// fails is still listed, without stats.
pub async fn list_with_stats(engine: &DockerEngine) -> Result<Vec<ContainerRecord>, AdapterError> {
    let containers = engine.list_containers().await?;
    let stats = futures::future::join_all(containers.iter().map(|c| async move {
        if c.state != "running" {
            return None;
        }
        match engine.container_stats(&c.id).await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(id = %c.id, "container stats failed: {e}");
                None
            }
        }
    }))
    .await;
    Ok(containers
        .into_iter()
        .zip(stats)
        .map(|(c, stats)| ContainerRecord {
            id: c.id,
            names: c
                .names
                .into_iter()
                .map(|n| n.trim_start_matches('/').to_string())
                .collect(),
            image: c.image,
            state: c.state,
            status: c.status,
            stats,
        })
        .collect())
}

// ---------- Actions ----------

pub fn action_args(action: Action, id: &str) -> Result<Vec<String>, AdapterError> {
    match action {
        Action::Restart => Ok(args(["restart", id])),
        Action::Stop => Ok(args(["stop", id])),
        Action::Remove => Ok(args(["rm", "-f", id])),
        other => Err(AdapterError::InvalidAction {
            scope: "docker",
            action: other.to_string(),
        }),
    }
}

pub async fn container_action(
    runner: &dyn CommandRunner,
    id: &str,
    action: Action,
) -> Result<ActionOutcome, AdapterError> {
    let argv = action_args(action, id)?;
    validate_target(Scope::Docker, id)?;
    let out = runner.run("docker", &argv).await?;
    info!(container = id, %action, "docker action done");
    Ok(ActionOutcome::ok(out.stdout.trim()))
}
