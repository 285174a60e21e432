//! JSON records served by the REST routes and pushed in websocket snapshots.
//! Field names here are what the dashboard page reads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProcessRecord {
    pub pid: i32,
    pub user: String,
    pub cpu_percent: f32,
    pub mem_percent: f32,
    pub state: String,
    pub start_time: String,
    // truncated for display
    pub command: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ProcessDetail {
    #[serde(flatten)]
    pub process: ProcessRecord,
    pub vsz_kb: Option<u64>,
    pub rss_kb: Option<u64>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    Journal,
    File,
    OpenFiles,
    None,
}

#[derive(Debug, Serialize, Clone)]
pub struct ProcessLogs {
    pub pid: i32,
    pub source: LogSource,
    pub lines: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub mem_used_mb: f64,
    pub mem_percent: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct ContainerRecord {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub state: String,
    pub status: String,
    pub stats: Option<ContainerStats>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Pm2ProcessRecord {
    pub name: String,
    pub pm2_id: i64,
    pub status: String,
    pub cpu_percent: f64,
    pub mem_mb: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetTotals {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetCounterSnapshot {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub ts_unix_ms: i64,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct NetInfo {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_bps: u64,
    pub tx_bps: u64,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct MemInfo {
    pub total: u64,
    pub free: u64,
    pub used_pct: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct HostMetrics {
    pub hostname: String,
    pub mem: MemInfo,
    pub net: NetInfo,
}

/// One websocket push: everything the dashboard renders.
#[derive(Debug, Serialize, Clone)]
pub struct Snapshot {
    pub ts_unix_ms: i64,
    pub metrics: HostMetrics,
    pub processes: Option<Vec<ProcessRecord>>,
    pub containers: Option<Vec<ContainerRecord>>,
    pub pm2: Option<Vec<Pm2ProcessRecord>>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

pub fn now_unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Round to two decimals the way the dashboard displays percentages.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
