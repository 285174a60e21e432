//! External command primitive. Every CLI the adapters touch (`ps`, `kill`,
//! `pm2`, `docker`, `journalctl`, `grep`, `lsof`) goes through `CommandRunner`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::AdapterError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, capture output, and reject a non-zero exit.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, AdapterError>;
}

pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, AdapterError> {
        debug!(program, ?args, "running command");
        // The child is not killed when we stop waiting; it runs to completion.
        let mut cmd = Command::new(program);
        cmd.args(args);
        let out = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(source)) => {
                return Err(AdapterError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(AdapterError::Timeout {
                    program: program.to_string(),
                    millis: self.timeout.as_millis() as u64,
                })
            }
        };
        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        if !out.status.success() {
            debug!(program, status = %out.status, "command exited non-zero");
            return Err(AdapterError::CommandFailed {
                program: program.to_string(),
                status: out.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

pub(crate) fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&str, &[String]) -> Result<String, AdapterError> + Send + Sync>;

    /// Records every call and answers through a closure.
    pub struct ScriptedRunner {
        handler: Handler,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedRunner {
        pub fn new(
            handler: impl Fn(&str, &[String]) -> Result<String, AdapterError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn programs(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(p, _)| p.clone())
                .collect()
        }
    }

    pub fn failed(program: &str) -> AdapterError {
        AdapterError::CommandFailed {
            program: program.to_string(),
            status: "exit status: 1".into(),
            stderr: String::new(),
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, AdapterError> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            (self.handler)(program, args).map(|stdout| CommandOutput {
                stdout,
                stderr: String::new(),
            })
        }
    }
}
