//! Ownership of a spawned service process.

// ============================================================================
// Imports
// ============================================================================

use std::process::ExitStatus;

use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Result;

use super::relay::{StreamKind, StreamRelay};

// ============================================================================
// ProcessHandle
// ============================================================================

/// A spawned process and the relays draining its output.
///
/// Dropping the handle aborts the relays but leaves the process running:
/// the service is shared infrastructure that may outlive its launcher.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    child: Option<Child>,
    relays: Vec<JoinHandle<u64>>,
}

impl ProcessHandle {
    /// Takes ownership of a child, attaching a relay to each piped stream.
    #[must_use]
    pub fn attach(mut child: Child) -> Self {
        let pid = child.id();
        let mut relays = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            relays.push(StreamRelay::spawn(
                StreamKind::Stdout,
                StreamKind::Stdout.default_listener(),
                stdout,
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            relays.push(StreamRelay::spawn(
                StreamKind::Stderr,
                StreamKind::Stderr.default_listener(),
                stderr,
            ));
        }

        debug!(pid, relays = relays.len(), "Process handle created");
        Self {
            pid,
            child: Some(child),
            relays,
        }
    }

    /// A handle for a process this crate did not spawn itself.
    #[must_use]
    pub fn external(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            child: None,
            relays: Vec::new(),
        }
    }

    /// Returns the OS process id, if known.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Number of relays still attached.
    #[inline]
    #[must_use]
    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }

    /// Releases the process and lets the relays run to end of stream.
    pub fn detach(mut self) {
        debug!(pid = self.pid, "Process handle detached");
        self.relays.clear();
        self.child.take();
    }

    /// Waits for the process to exit and its relays to drain.
    ///
    /// Returns `None` for an external handle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if waiting on the child fails.
    pub async fn wait(mut self) -> Result<Option<ExitStatus>> {
        let status = match self.child.as_mut() {
            Some(child) => Some(child.wait().await?),
            None => None,
        };

        for relay in self.relays.drain(..) {
            if let Err(e) = relay.await {
                debug!(pid = self.pid, error = %e, "Relay task failed");
            }
        }
        Ok(status)
    }

    /// Kills the process and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            debug!(pid = self.pid, "Killing service process");
            child.kill().await?;
            info!(pid = self.pid, "Service process terminated");
        }
        self.abort_relays();
        Ok(())
    }

    fn abort_relays(&mut self) {
        for relay in self.relays.drain(..) {
            relay.abort();
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.abort_relays();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_handle() {
        let handle = ProcessHandle::external(4242);
        assert_eq!(handle.pid(), Some(4242));
        assert_eq!(handle.relay_count(), 0);
    }

    #[tokio::test]
    async fn test_external_wait_returns_none() {
        let status = ProcessHandle::external(1).wait().await.unwrap();
        assert!(status.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_attach_relays_both_streams() {
        use std::process::Stdio;
        use tokio::process::Command;

        let child = Command::new("sh")
            .args(["-c", "echo out; echo err >&2"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let handle = ProcessHandle::attach(child);
        assert!(handle.pid().is_some());
        assert_eq!(handle.relay_count(), 2);

        let status = handle.wait().await.unwrap().unwrap();
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_stops_process() {
        use std::process::Stdio;
        use tokio::process::Command;

        let child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let mut handle = ProcessHandle::attach(child);
        handle.kill().await.unwrap();
        assert_eq!(handle.relay_count(), 0);
    }
}
