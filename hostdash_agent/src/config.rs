//! Runtime configuration: CLI flags plus `HOSTDASH_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 7100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("HOSTDASH_ADMIN_PASSWORD must be set; refusing to start without credentials")]
    MissingPassword,
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub enable_ssl: bool,
    pub admin_user: String,
    pub admin_password: String,
    pub api_token: Option<String>,
    pub session_ttl: Duration,
    pub lockout_attempts: u32,
    pub lockout: Duration,
    pub poll_interval: Duration,
    pub command_timeout: Duration,
    pub enable_pm2: bool,
    pub enable_docker: bool,
    pub enable_procs: bool,
    pub pm2_bin: String,
    pub docker_socket: PathBuf,
    pub net_dev_path: PathBuf,
    pub upstream_url: Option<String>,
    pub upstream_token: Option<String>,
}

/// Port from `--port N`, `-p N` or `--port=N`; long form wins.
pub fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut long: Option<String> = None;
    let mut short: Option<String> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "--port" => long = it.next(),
            "-p" => short = it.next(),
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    long = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    long.or(short)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}

pub fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--port PORT|-p PORT] [--enableSSL]\n\
         Required env: HOSTDASH_ADMIN_PASSWORD\n\
         Optional env: HOSTDASH_ADMIN_USER, HOSTDASH_API_TOKEN, HOSTDASH_SESSION_TTL_SECS,\n\
         \x20 HOSTDASH_LOCKOUT_ATTEMPTS, HOSTDASH_LOCKOUT_SECS, HOSTDASH_POLL_MS,\n\
         \x20 HOSTDASH_CMD_TIMEOUT_MS, HOSTDASH_ENABLE_PM2, HOSTDASH_ENABLE_DOCKER,\n\
         \x20 HOSTDASH_ENABLE_PROCS, HOSTDASH_PM2_BIN, HOSTDASH_DOCKER_SOCKET,\n\
         \x20 HOSTDASH_NET_DEV, HOSTDASH_UPSTREAM_URL, HOSTDASH_UPSTREAM_TOKEN"
    )
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn flag(v: Option<String>, default: bool) -> bool {
    match v.as_deref().map(str::trim) {
        None | Some("") => default,
        Some(s) => !matches!(s, "0" | "false" | "no" | "off"),
    }
}

fn number<T: std::str::FromStr>(
    name: &'static str,
    v: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match non_empty(v) {
        None => Ok(default),
        Some(s) => s.parse().map_err(|_| ConfigError::Invalid { name, value: s }),
    }
}

impl Config {
    /// Build from argv and an env lookup (injected so tests stay hermetic).
    pub fn from_sources<I, F>(args: I, env: F) -> Result<Config, ConfigError>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let port = parse_port(args.clone(), DEFAULT_PORT);
        let enable_ssl =
            args.iter().any(|a| a == "--enableSSL") || flag(env("HOSTDASH_ENABLE_SSL"), false);

        let admin_password =
            non_empty(env("HOSTDASH_ADMIN_PASSWORD")).ok_or(ConfigError::MissingPassword)?;
        let admin_user = non_empty(env("HOSTDASH_ADMIN_USER")).unwrap_or_else(|| "admin".into());

        Ok(Config {
            port,
            enable_ssl,
            admin_user,
            admin_password,
            api_token: non_empty(env("HOSTDASH_API_TOKEN")),
            session_ttl: Duration::from_secs(number(
                "HOSTDASH_SESSION_TTL_SECS",
                env("HOSTDASH_SESSION_TTL_SECS"),
                8 * 3600,
            )?),
            lockout_attempts: number(
                "HOSTDASH_LOCKOUT_ATTEMPTS",
                env("HOSTDASH_LOCKOUT_ATTEMPTS"),
                5,
            )?,
            lockout: Duration::from_secs(number(
                "HOSTDASH_LOCKOUT_SECS",
                env("HOSTDASH_LOCKOUT_SECS"),
                15 * 60,
            )?),
            poll_interval: Duration::from_millis(
                number("HOSTDASH_POLL_MS", env("HOSTDASH_POLL_MS"), 5_000u64)?.max(250),
            ),
            command_timeout: Duration::from_millis(number(
                "HOSTDASH_CMD_TIMEOUT_MS",
                env("HOSTDASH_CMD_TIMEOUT_MS"),
                10_000,
            )?),
            enable_pm2: flag(env("HOSTDASH_ENABLE_PM2"), true),
            enable_docker: flag(env("HOSTDASH_ENABLE_DOCKER"), true),
            enable_procs: flag(env("HOSTDASH_ENABLE_PROCS"), true),
            pm2_bin: non_empty(env("HOSTDASH_PM2_BIN")).unwrap_or_else(|| "pm2".into()),
            docker_socket: non_empty(env("HOSTDASH_DOCKER_SOCKET"))
                .unwrap_or_else(|| "/var/run/docker.sock".into())
                .into(),
            net_dev_path: non_empty(env("HOSTDASH_NET_DEV"))
                .unwrap_or_else(|| "/proc/net/dev".into())
                .into(),
            upstream_url: non_empty(env("HOSTDASH_UPSTREAM_URL")),
            upstream_token: non_empty(env("HOSTDASH_UPSTREAM_TOKEN")),
        })
    }

    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_sources(std::env::args(), |k| std::env::var(k).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn argv(a: &[&str]) -> Vec<String> {
        std::iter::once("hostdash_agent")
            .chain(a.iter().copied())
            .map(String::from)
            .collect()
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn missing_password_is_fatal() {
        let err = Config::from_sources(argv(&[]), env_of(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingPassword);
        let err = Config::from_sources(argv(&[]), env_of(&[("HOSTDASH_ADMIN_PASSWORD", "  ")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingPassword);
    }

    #[test]
    fn defaults() {
        let c = Config::from_sources(argv(&[]), env_of(&[("HOSTDASH_ADMIN_PASSWORD", "pw")]))
            .unwrap();
        assert_eq!(c.port, DEFAULT_PORT);
        assert_eq!(c.admin_user, "admin");
        assert_eq!(c.poll_interval, Duration::from_secs(5));
        assert_eq!(c.lockout_attempts, 5);
        assert!(c.enable_pm2 && c.enable_docker && c.enable_procs);
        assert!(!c.enable_ssl);
        assert!(c.upstream_url.is_none());
    }

    #[test]
    fn flags_and_overrides() {
        let c = Config::from_sources(
            argv(&["-p", "9001", "--enableSSL"]),
            env_of(&[
                ("HOSTDASH_ADMIN_PASSWORD", "pw"),
                ("HOSTDASH_ENABLE_DOCKER", "0"),
                ("HOSTDASH_POLL_MS", "1000"),
                ("HOSTDASH_UPSTREAM_URL", "http://api.internal:7100"),
            ]),
        )
        .unwrap();
        assert_eq!(c.port, 9001);
        assert!(c.enable_ssl);
        assert!(!c.enable_docker);
        assert_eq!(c.poll_interval, Duration::from_secs(1));
        assert_eq!(c.upstream_url.as_deref(), Some("http://api.internal:7100"));
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = Config::from_sources(
            argv(&[]),
            env_of(&[("HOSTDASH_ADMIN_PASSWORD", "pw"), ("HOSTDASH_LOCKOUT_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "HOSTDASH_LOCKOUT_SECS", .. }));
    }

    #[test]
    fn port_forms() {
        assert_eq!(parse_port(argv(&["--port", "9001"]), 7100), 9001);
        assert_eq!(parse_port(argv(&["--port=9003"]), 7100), 9003);
        assert_eq!(parse_port(argv(&["-p", "x"]), 7100), 7100);
    }
}
