//! OS process table via `ps`, signals via `kill`, best-effort log lookup.

use std::path::Path;

use tracing::{debug, info};

use crate::action::Action;
use crate::error::AdapterError;
use crate::exec::{args, CommandRunner};
use crate::types::{ActionOutcome, LogSource, ProcessDetail, ProcessLogs, ProcessRecord};

pub const TOP_N: usize = 50;
pub const COMMAND_WIDTH: usize = 50;
// `start_time` is one token (HH:MM, MmmDD or YYYY); plain `start` prints
// "Oct 15" for anything older than a day.
const PS_COLUMNS: &str = "pid,user,%cpu,%mem,stat,start_time,command";
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const JOURNAL_LINES: &str = "50";
const GREP_MATCHES: usize = 20;

/// Parse one `ps` row: pid user %cpu %mem stat start command...
/// Returns None for rows that do not carry all seven columns. A start column
/// printed as "Oct 15" is folded back into one field.
pub fn parse_ps_line(line: &str) -> Option<ProcessRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 7 {
        return None;
    }
    let pid = tokens[0].parse::<i32>().ok()?;
    let split_date = MONTHS.contains(&tokens[5])
        && tokens.len() >= 8
        && tokens[6].len() <= 2
        && tokens[6].bytes().all(|b| b.is_ascii_digit());
    let (start_time, command) = if split_date {
        (format!("{}{:0>2}", tokens[5], tokens[6]), tokens[7..].join(" "))
    } else {
        (tokens[5].to_string(), tokens[6..].join(" "))
    };
    Some(ProcessRecord {
        pid,
        user: tokens[1].to_string(),
        cpu_percent: tokens[2].parse().unwrap_or(0.0),
        mem_percent: tokens[3].parse().unwrap_or(0.0),
        state: tokens[4].to_string(),
        start_time,
        command: truncate_chars(&command, COMMAND_WIDTH),
    })
}

pub fn parse_ps_output(text: &str, limit: usize) -> Vec<ProcessRecord> {
    text.lines().filter_map(parse_ps_line).take(limit).collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Executable basename from a command line: "/usr/bin/node server.js" -> "node".
pub fn exe_basename(command: &str) -> Option<String> {
    let first = command.split_whitespace().next()?;
    let base = Path::new(first).file_name()?.to_str()?;
    // "nginx:" style titles and login shells ("-bash")
    let base = base.trim_end_matches(':').trim_start_matches('-');
    (!base.is_empty()).then(|| base.to_string())
}

pub async fn list_processes(runner: &dyn CommandRunner) -> Result<Vec<ProcessRecord>, AdapterError> {
    let out = runner
        .run(
            "ps",
            &args(["-eo", PS_COLUMNS, "--sort=-%cpu", "--no-headers"]),
        )
        .await?;
    Ok(parse_ps_output(&out.stdout, TOP_N))
}

pub async fn process_detail(
    runner: &dyn CommandRunner,
    pid: i32,
) -> Result<ProcessDetail, AdapterError> {
    let pid_s = pid.to_string();
    // ps exits 1 for an unknown pid
    let out = runner
        .run("ps", &args(["-p", &pid_s, "-o", PS_COLUMNS, "--no-headers"]))
        .await
        .map_err(|e| match e {
            AdapterError::CommandFailed { .. } => AdapterError::NotFound(format!("pid {pid}")),
            other => other,
        })?;
    let process = parse_ps_output(&out.stdout, 1)
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::NotFound(format!("pid {pid}")))?;

    let (vsz_kb, rss_kb) = match runner
        .run("ps", &args(["-p", &pid_s, "-o", "vsz,rss", "--no-headers"]))
        .await
    {
        Ok(o) => {
            let mut it = o.stdout.split_whitespace().map(|v| v.parse::<u64>().ok());
            (it.next().flatten(), it.next().flatten())
        }
        Err(e) => {
            debug!(pid, "memory columns unavailable: {e}");
            (None, None)
        }
    };

    Ok(ProcessDetail {
        process,
        vsz_kb,
        rss_kb,
    })
}

/// Send a termination signal. Success means the signal was issued; whether the
/// process actually exits shows up on the next poll.
pub async fn kill_process(
    runner: &dyn CommandRunner,
    pid: i32,
    action: Action,
) -> Result<ActionOutcome, AdapterError> {
    let signal = match action {
        Action::Kill => "-TERM",
        Action::ForceKill => "-KILL",
        other => {
            return Err(AdapterError::InvalidAction {
                scope: "process",
                action: other.to_string(),
            })
        }
    };
    if pid <= 0 {
        return Err(AdapterError::NotFound(format!("pid {pid}")));
    }
    runner.run("kill", &args([signal, &pid.to_string()])).await?;
    info!(pid, signal, "signal sent");
    Ok(ActionOutcome::ok(format!("sent {signal} to {pid}")))
}

/// Log files searched by the grep strategy, in order.
pub fn candidate_log_files(exe: &str) -> Vec<String> {
    vec![
        format!("/var/log/{exe}.log"),
        "/var/log/syslog".to_string(),
        "/var/log/messages".to_string(),
    ]
}

async fn logs_from_journal(runner: &dyn CommandRunner, exe: &str) -> Vec<String> {
    let unit = exe.to_string();
    match runner
        .run(
            "journalctl",
            &args([
                "-u",
                &unit,
                "--since",
                "1 hour ago",
                "-n",
                JOURNAL_LINES,
                "--no-pager",
            ]),
        )
        .await
    {
        // journalctl prints "-- No entries --" when the unit exists but is quiet
        Ok(o) => o
            .stdout
            .lines()
            .filter(|l| !l.trim().is_empty() && !l.starts_with("-- "))
            .map(str::to_string)
            .collect(),
        Err(e) => {
            debug!(exe, "journal lookup failed: {e}");
            Vec::new()
        }
    }
}

async fn logs_from_files(runner: &dyn CommandRunner, pid: i32, exe: &str) -> Vec<String> {
    let pid_s = pid.to_string();
    let mut matches = Vec::new();
    for file in candidate_log_files(exe) {
        if tokio::fs::metadata(&file).await.is_err() {
            continue;
        }
        // grep exits 1 on no match; that is just an empty strategy
        if let Ok(o) = runner
            .run("grep", &args(["-h", "-F", "-e", &pid_s, "-e", exe, &file]))
            .await
        {
            matches.extend(o.stdout.lines().map(str::to_string));
        }
    }
    let skip = matches.len().saturating_sub(GREP_MATCHES);
    matches.split_off(skip)
}

async fn logs_from_open_files(runner: &dyn CommandRunner, pid: i32) -> Vec<String> {
    match runner.run("lsof", &args(["-p", &pid.to_string()])).await {
        Ok(o) => o
            .stdout
            .lines()
            .skip(1)
            .filter(|l| l.contains("log") || l.contains("tmp"))
            .map(str::to_string)
            .collect(),
        Err(e) => {
            debug!(pid, "lsof failed: {e}");
            Vec::new()
        }
    }
}

/// Walk journal -> log files -> open fds; the first strategy with output wins.
pub async fn process_logs(
    runner: &dyn CommandRunner,
    pid: i32,
    command: &str,
) -> ProcessLogs {
    let exe = exe_basename(command).unwrap_or_else(|| pid.to_string());

    let lines = logs_from_journal(runner, &exe).await;
    if !lines.is_empty() {
        return ProcessLogs {
            pid,
            source: LogSource::Journal,
            lines,
        };
    }
    let lines = logs_from_files(runner, pid, &exe).await;
    if !lines.is_empty() {
        return ProcessLogs {
            pid,
            source: LogSource::File,
            lines,
        };
    }
    let lines = logs_from_open_files(runner, pid).await;
    if !lines.is_empty() {
        return ProcessLogs {
            pid,
            source: LogSource::OpenFiles,
            lines,
        };
    }
    ProcessLogs {
        pid,
        source: LogSource::None,
        lines: vec![format!("No logs found for PID {pid} ({command})")],
    }
}
