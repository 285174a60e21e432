//! Host metrics (memory via sysinfo, throughput via /proc/net/dev) and the
//! combined snapshot pushed to websocket clients.

use std::sync::Arc;

use tracing::warn;

use crate::docker;
use crate::error::AdapterError;
use crate::net::read_net_totals;
use crate::procs;
use crate::state::AppState;
use crate::types::{
    now_unix_ms, round2, ContainerRecord, HostMetrics, MemInfo, Pm2ProcessRecord, ProcessRecord,
    Snapshot,
};

pub fn mem_info(total: u64, free: u64) -> MemInfo {
    let used_pct = if total == 0 {
        0.0
    } else {
        round2(total.saturating_sub(free) as f64 / total as f64 * 100.0)
    };
    MemInfo {
        total,
        free,
        used_pct,
    }
}

pub async fn collect_host_metrics(state: &AppState) -> HostMetrics {
    let mem = {
        let mut sys = state.sys.lock().await;
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sys.refresh_memory();
        })) {
            warn!("sysinfo memory refresh panicked: {e:?}");
        }
        mem_info(sys.total_memory(), sys.available_memory())
    };

    // read outside the tracker lock; the tracker serializes compute+store
    let totals = read_net_totals(&state.net_dev_path).await;
    let net = state.net.sample(totals, now_unix_ms());

    HostMetrics {
        hostname: state.hostname.clone(),
        mem,
        net,
    }
}

pub async fn collect_processes(state: &AppState) -> Result<Vec<ProcessRecord>, AdapterError> {
    if !state.procs_enabled {
        return Err(AdapterError::Disabled("process"));
    }
    procs::list_processes(state.runner.as_ref()).await
}

pub async fn collect_containers(state: &AppState) -> Result<Vec<ContainerRecord>, AdapterError> {
    let engine = state.docker.as_ref().ok_or(AdapterError::Disabled("docker"))?;
    docker::list_with_stats(engine).await
}

pub async fn collect_pm2(state: &AppState) -> Result<Vec<Pm2ProcessRecord>, AdapterError> {
    let pm2 = state.pm2.as_ref().map(Arc::clone).ok_or(AdapterError::Disabled("pm2"))?;
    pm2.list(state.runner.as_ref()).await
}

fn keep<T>(errors: &mut Vec<String>, r: Result<T, AdapterError>) -> Option<T> {
    match r {
        Ok(v) => Some(v),
        Err(AdapterError::Disabled(_)) => None,
        Err(e) => {
            errors.push(e.to_string());
            None
        }
    }
}

/// Everything at once; one failing backend only adds an entry to `errors`.
pub async fn collect_snapshot(state: &AppState) -> Snapshot {
    let (metrics, processes, containers, pm2) = tokio::join!(
        collect_host_metrics(state),
        collect_processes(state),
        collect_containers(state),
        collect_pm2(state),
    );
    let mut errors = Vec::new();
    let processes = keep(&mut errors, processes);
    let containers = keep(&mut errors, containers);
    let pm2 = keep(&mut errors, pm2);
    Snapshot {
        ts_unix_ms: now_unix_ms(),
        metrics,
        processes,
        containers,
        pm2,
        errors,
    }
}
