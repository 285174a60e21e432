//! Shared agent state: adapters, the net-rate tracker, the sysinfo handle and
//! the auth tables.

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tokio::sync::Mutex;

use crate::auth::{Credentials, LoginLimiter, SessionStore};
use crate::config::Config;
use crate::docker::DockerEngine;
use crate::error::AdapterError;
use crate::exec::{CommandRunner, SystemRunner};
use crate::net::NetRateTracker;
use crate::pm2::Pm2;
use crate::upstream::UpstreamApi;

pub type SharedSystem = Arc<Mutex<System>>;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<dyn CommandRunner>,
    pub sys: SharedSystem,
    pub net: Arc<NetRateTracker>,
    pub net_dev_path: PathBuf,
    pub hostname: String,

    // Backends; None = disabled on this host
    pub pm2: Option<Arc<Pm2>>,
    pub docker: Option<DockerEngine>,
    pub procs_enabled: bool,
    pub upstream: Option<UpstreamApi>,

    pub credentials: Arc<Credentials>,
    pub limiter: Arc<LoginLimiter>,
    pub sessions: Arc<SessionStore>,
    pub api_token: Option<String>,
    pub secure_cookies: bool,

    pub poll_interval: Duration,
    pub client_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn from_config(cfg: &Config) -> Result<Self, AdapterError> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(cfg.command_timeout));
        Self::with_runner(cfg, runner)
    }

    /// Same as `from_config` with a caller-supplied command primitive.
    pub fn with_runner(cfg: &Config, runner: Arc<dyn CommandRunner>) -> Result<Self, AdapterError> {
        let refresh = RefreshKind::nothing().with_memory(MemoryRefreshKind::everything());
        let sys = System::new_with_specifics(refresh);

        let upstream = match cfg.upstream_url.as_deref() {
            Some(url) => Some(UpstreamApi::new(
                url,
                cfg.upstream_token.clone(),
                cfg.command_timeout,
            )?),
            None => None,
        };

        let hostname = hostname::get()
            .ok()
            .and_then(|s| s.into_string().ok())
            .unwrap_or_else(|| "unknown".into());

        Ok(AppState {
            runner,
            sys: Arc::new(Mutex::new(sys)),
            net: Arc::new(NetRateTracker::new()),
            net_dev_path: cfg.net_dev_path.clone(),
            hostname,
            pm2: cfg.enable_pm2.then(|| Arc::new(Pm2::new(cfg.pm2_bin.clone()))),
            docker: cfg
                .enable_docker
                .then(|| DockerEngine::new(cfg.docker_socket.clone())),
            procs_enabled: cfg.enable_procs,
            upstream,
            credentials: Arc::new(Credentials {
                username: cfg.admin_user.clone(),
                password: cfg.admin_password.clone(),
            }),
            limiter: Arc::new(LoginLimiter::new(cfg.lockout_attempts, cfg.lockout)),
            sessions: Arc::new(SessionStore::new(cfg.session_ttl)),
            api_token: cfg.api_token.clone(),
            secure_cookies: cfg.enable_ssl,
            poll_interval: cfg.poll_interval,
            client_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}
