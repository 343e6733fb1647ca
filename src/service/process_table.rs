//! OS process table access.
//!
//! [`ProcessTable`] is the seam between the supervisor and the operating
//! system. [`SystemProcessTable`] is the production adapter:
//!
//! | Platform | Port query | Names | Terminate |
//! |----------|------------|-------|-----------|
//! | Unix | `lsof -nP -iTCP:<port> -sTCP:LISTEN` | `lsof` COMMAND column | `sysinfo` kill |
//! | Windows | `netstat -ano -p TCP` | `sysinfo` | `sysinfo` kill |
//!
//! A missing query tool means "nothing found", not an error.

// ============================================================================
// Imports
// ============================================================================

use std::ffi::{OsStr, OsString};
use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::process::Command;
use tokio::task::spawn_blocking;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::handle::ProcessHandle;

// ============================================================================
// ProcessInfo
// ============================================================================

/// A process bound to a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessInfo {
    /// OS process id.
    pub pid: u32,
    /// Process or command name.
    pub name: String,
}

impl ProcessInfo {
    /// Creates a process record.
    #[inline]
    #[must_use]
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }

    /// Returns `true` if the name contains `marker`, ignoring ASCII case.
    #[must_use]
    pub fn matches(&self, marker: &str) -> bool {
        self.name
            .to_ascii_lowercase()
            .contains(&marker.to_ascii_lowercase())
    }
}

// ============================================================================
// ProcessTable
// ============================================================================

/// Access to the OS process table.
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Lists processes listening on the TCP `port`.
    async fn list_processes_on_port(&self, port: u16) -> Result<Vec<ProcessInfo>>;

    /// Forcefully terminates a process. A process that is already gone is
    /// not an error.
    async fn terminate(&self, pid: u32) -> Result<()>;

    /// Spawns `program` with piped output streams.
    async fn spawn(&self, program: &OsStr, args: &[OsString]) -> Result<ProcessHandle>;
}

// ============================================================================
// SystemProcessTable
// ============================================================================

/// Process table backed by the host operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    /// Creates the system adapter.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Runs a query tool, mapping "not installed" to `None`.
    async fn run_tool(program: &str, args: &[&str]) -> Result<Option<String>> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => {
                // lsof exits 1 when nothing matches.
                if !output.status.success() && output.stdout.is_empty() {
                    trace!(program, status = %output.status, "Query tool found nothing");
                    return Ok(None);
                }
                Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(program, "Query tool not installed");
                Ok(None)
            }
            Err(e) => Err(Error::process_query(format!("Failed to run {program}: {e}"))),
        }
    }
}

#[async_trait]
impl ProcessTable for SystemProcessTable {
    #[cfg(not(windows))]
    async fn list_processes_on_port(&self, port: u16) -> Result<Vec<ProcessInfo>> {
        let filter = format!("-iTCP:{port}");
        let output = Self::run_tool("lsof", &["-nP", filter.as_str(), "-sTCP:LISTEN"]).await?;
        Ok(output.as_deref().map(parse_lsof).unwrap_or_default())
    }

    #[cfg(windows)]
    async fn list_processes_on_port(&self, port: u16) -> Result<Vec<ProcessInfo>> {
        let Some(output) = Self::run_tool("netstat", &["-ano", "-p", "TCP"]).await? else {
            return Ok(Vec::new());
        };
        let pids = parse_netstat(&output, port);
        if pids.is_empty() {
            return Ok(Vec::new());
        }

        spawn_blocking(move || resolve_names(&pids))
            .await
            .map_err(|e| Error::process_query(format!("Name lookup task failed: {e}")))
    }

    async fn terminate(&self, pid: u32) -> Result<()> {
        spawn_blocking(move || kill_pid(pid))
            .await
            .map_err(|e| Error::process_query(format!("Kill task failed: {e}")))?
    }

    async fn spawn(&self, program: &OsStr, args: &[OsString]) -> Result<ProcessHandle> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(Error::process_launch_failed)?;

        Ok(ProcessHandle::attach(child))
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses `lsof` output into unique processes, in order of appearance.
///
/// Expects the default column layout, `COMMAND PID USER ...`.
#[must_use]
pub fn parse_lsof(output: &str) -> Vec<ProcessInfo> {
    let mut seen = FxHashSet::default();

    output
        .lines()
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let command = columns.next()?;
            let pid = columns.next()?.parse::<u32>().ok()?;
            Some(ProcessInfo::new(pid, command))
        })
        .filter(|process| seen.insert(process.pid))
        .collect()
}

/// Parses `netstat -ano` output into unique pids listening on `port`.
///
/// Expects rows of the form `TCP <local> <foreign> LISTENING <pid>`.
#[must_use]
pub fn parse_netstat(output: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{port}");
    let mut seen = FxHashSet::default();

    output
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            match columns.as_slice() {
                [proto, local, _foreign, state, pid]
                    if proto.eq_ignore_ascii_case("TCP")
                        && local.ends_with(&suffix)
                        && state.eq_ignore_ascii_case("LISTENING") =>
                {
                    pid.parse::<u32>().ok()
                }
                _ => None,
            }
        })
        .filter(|pid| seen.insert(*pid))
        .collect()
}

// ============================================================================
// sysinfo Helpers
// ============================================================================

#[cfg_attr(not(windows), allow(dead_code))]
fn resolve_names(pids: &[u32]) -> Vec<ProcessInfo> {
    let targets: Vec<Pid> = pids.iter().copied().map(Pid::from_u32).collect();
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&targets), true);

    targets
        .iter()
        .filter_map(|pid| {
            let process = system.process(*pid)?;
            Some(ProcessInfo::new(
                pid.as_u32(),
                process.name().to_string_lossy(),
            ))
        })
        .collect()
}

fn kill_pid(pid: u32) -> Result<()> {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

    let Some(process) = system.process(target) else {
        debug!(pid, "Process already gone");
        return Ok(());
    };

    if process.kill() {
        Ok(())
    } else {
        Err(Error::process_query(format!("Failed to signal process {pid}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LSOF_OUTPUT: &str = "\
COMMAND   PID   USER   FD   TYPE DEVICE SIZE/OFF NODE NAME
java    31337 runner   42u  IPv6 0x1234      0t0  TCP *:9092 (LISTEN)
java    31337 runner   43u  IPv4 0x5678      0t0  TCP *:9092 (LISTEN)
python   4242 runner    7u  IPv4 0x9abc      0t0  TCP 127.0.0.1:9092 (LISTEN)
";

    const NETSTAT_OUTPUT: &str = "
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1000
  TCP    0.0.0.0:9092           0.0.0.0:0              LISTENING       5150
  TCP    [::]:9092              [::]:0                 LISTENING       5150
  TCP    127.0.0.1:9092         127.0.0.1:50000        ESTABLISHED     5150
  TCP    0.0.0.0:19092          0.0.0.0:0              LISTENING       6000
  TCP    127.0.0.1:50000        127.0.0.1:9092         ESTABLISHED     7000
";

    #[test]
    fn test_parse_lsof() {
        let processes = parse_lsof(LSOF_OUTPUT);
        assert_eq!(
            processes,
            vec![
                ProcessInfo::new(31337, "java"),
                ProcessInfo::new(4242, "python"),
            ]
        );
    }

    #[test]
    fn test_parse_lsof_empty() {
        assert!(parse_lsof("").is_empty());
    }

    #[test]
    fn test_parse_netstat() {
        assert_eq!(parse_netstat(NETSTAT_OUTPUT, 9092), vec![5150]);
        assert_eq!(parse_netstat(NETSTAT_OUTPUT, 135), vec![1000]);
        assert!(parse_netstat(NETSTAT_OUTPUT, 9091).is_empty());
    }

    #[test]
    fn test_marker_match_ignores_case() {
        assert!(ProcessInfo::new(1, "java.exe").matches("java"));
        assert!(ProcessInfo::new(1, "Java").matches("java"));
        assert!(!ProcessInfo::new(1, "python").matches("java"));
    }

    #[tokio::test]
    async fn test_terminate_missing_pid_is_ok() {
        // Above the default pid_max on Linux and far beyond typical macOS pids.
        let result = SystemProcessTable::new().terminate(u32::MAX - 1).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let err = SystemProcessTable::new()
            .spawn(OsStr::new("definitely-not-a-real-runtime"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProcessLaunchFailed { .. }));
    }
}
