//! PM2 adapter. Reads `pm2 jlist` and drives `pm2 <action> <id>`.

use serde::Deserialize;
use tracing::info;

use crate::action::{validate_target, Action, Scope};
use crate::docker::bytes_to_mb;
use crate::error::AdapterError;
use crate::exec::{args, CommandRunner};
use crate::types::{ActionOutcome, Pm2ProcessRecord};

#[derive(Debug, Default, Deserialize)]
struct Monit {
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    memory: u64,
}

#[derive(Debug, Default, Deserialize)]
struct Pm2Env {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JlistEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    pm_id: i64,
    #[serde(default)]
    pm2_env: Option<Pm2Env>,
    #[serde(default)]
    monit: Option<Monit>,
}

impl From<JlistEntry> for Pm2ProcessRecord {
    fn from(e: JlistEntry) -> Self {
        let monit = e.monit.unwrap_or_default();
        Pm2ProcessRecord {
            name: e.name,
            pm2_id: e.pm_id,
            status: e
                .pm2_env
                .and_then(|env| env.status)
                .unwrap_or_else(|| "unknown".to_string()),
            cpu_percent: monit.cpu,
            mem_mb: bytes_to_mb(monit.memory),
        }
    }
}

/// `pm2 jlist` may print daemon banners ("[PM2] Spawning...") before the
/// JSON array, so try each '[' until one parses.
pub fn parse_jlist(stdout: &str) -> Result<Vec<Pm2ProcessRecord>, AdapterError> {
    let mut last_err = None;
    for (start, _) in stdout.match_indices('[') {
        match serde_json::from_str::<Vec<JlistEntry>>(stdout[start..].trim_end()) {
            Ok(entries) => return Ok(entries.into_iter().map(Pm2ProcessRecord::from).collect()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(AdapterError::Parse(match last_err {
        Some(e) => format!("pm2 jlist: {e}"),
        None => "pm2 jlist: no JSON array".to_string(),
    }))
}

pub struct Pm2 {
    bin: String,
}

impl Pm2 {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    pub async fn list(&self, runner: &dyn CommandRunner) -> Result<Vec<Pm2ProcessRecord>, AdapterError> {
        let out = runner.run(&self.bin, &args(["jlist"])).await?;
        parse_jlist(&out.stdout)
    }

    /// Single process by numeric id or by name.
    pub async fn describe(
        &self,
        runner: &dyn CommandRunner,
        id: &str,
    ) -> Result<Pm2ProcessRecord, AdapterError> {
        self.list(runner)
            .await?
            .into_iter()
            .find(|p| p.pm2_id.to_string() == id || p.name == id)
            .ok_or_else(|| AdapterError::NotFound(format!("pm2 process {id}")))
    }

    pub async fn action(
        &self,
        runner: &dyn CommandRunner,
        id: &str,
        action: Action,
    ) -> Result<ActionOutcome, AdapterError> {
        match action {
            Action::Restart | Action::Stop | Action::Delete | Action::Start => {}
            other => {
                return Err(AdapterError::InvalidAction {
                    scope: "pm2",
                    action: other.to_string(),
                })
            }
        }
        validate_target(Scope::Pm2, id)?;
        let out = runner.run(&self.bin, &args([action.as_str(), id])).await?;
        info!(pm2_id = id, %action, "pm2 action done");
        Ok(ActionOutcome::ok(out.stdout.trim()))
    }
}
