//! Best-effort lifecycle management of the sidecar service.
//!
//! The service on a fixed port is shared: another process may have started
//! it, or may stop it at any time. Every operation here therefore logs and
//! swallows OS faults instead of returning them.
//!
//! # Start Sequence
//!
//! 1. Take the lock file, when `lock_dir` is configured
//! 2. Sleep a random delay in `[0, max_slow_start_delay]`
//! 3. Query the process table for a matching listener on the port
//! 4. If none, spawn `<runtime> <launch args>` and keep its handle
//! 5. With the lock held, poll until the new process listens or
//!    `startup_timeout` elapses, then release the lock
//!
//! Without a lock, `start` returns as soon as the spawn call returns.
//! Callers that need the service to accept connections retry their first
//! call, see [`crate::transport::RpcClient::connect_with_retry`].

// ============================================================================
// Imports
// ============================================================================

use std::ffi::OsStr;
use std::fs::{File, OpenOptions, create_dir_all};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use rustc_hash::FxHashMap;
use tokio::task::spawn_blocking;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use super::config::ServiceConfig;
use super::handle::ProcessHandle;
use super::process_table::{ProcessTable, SystemProcessTable};

// ============================================================================
// Constants
// ============================================================================

/// Interval between listen checks of a freshly launched service.
const LISTEN_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// StartOutcome
// ============================================================================

/// Result of a start attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A matching process already listens on the port.
    AlreadyRunning,
    /// The service was spawned; carries its pid when known.
    Launched(Option<u32>),
    /// The spawn failed. The cause was logged.
    Failed,
}

impl StartOutcome {
    /// Returns `true` unless the start failed.
    #[inline]
    #[must_use]
    pub fn is_available(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

// ============================================================================
// ServiceSupervisor
// ============================================================================

/// Starts and stops the sidecar service.
///
/// Methods take `&self`; share the supervisor through an `Arc` to call it
/// from several tasks.
#[derive(Debug)]
pub struct ServiceSupervisor<P = SystemProcessTable> {
    config: ServiceConfig,
    table: P,
    handles: Mutex<FxHashMap<u16, ProcessHandle>>,
}

impl ServiceSupervisor<SystemProcessTable> {
    /// Creates a supervisor over the host process table.
    #[must_use]
    pub fn system(config: ServiceConfig) -> Self {
        Self::new(config, SystemProcessTable::new())
    }
}

impl<P: ProcessTable> ServiceSupervisor<P> {
    /// Creates a supervisor over the given process table.
    #[must_use]
    pub fn new(config: ServiceConfig, table: P) -> Self {
        Self {
            config,
            table,
            handles: Mutex::new(FxHashMap::default()),
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the process table.
    #[inline]
    #[must_use]
    pub fn table(&self) -> &P {
        &self.table
    }

    /// Returns `true` if a process matching the marker listens on `port`.
    ///
    /// Query failures are logged and reported as not running.
    pub async fn is_running(&self, port: u16) -> bool {
        match self.table.list_processes_on_port(port).await {
            Ok(processes) => {
                let running = processes
                    .iter()
                    .any(|process| process.matches(&self.config.process_marker));
                debug!(port, running, candidates = processes.len(), "Checked service");
                running
            }
            Err(e) => {
                warn!(port, error = %e, "Failed to query process table");
                false
            }
        }
    }

    /// Starts the service on `port` unless it already runs.
    pub async fn start(&self, port: u16) -> StartOutcome {
        let lock = self.acquire_lock(port).await;

        let delay = self.debounce_delay();
        if !delay.is_zero() {
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            debug!(port, delay_ms, "Debouncing service start");
            sleep(delay).await;
        }

        if self.is_running(port).await {
            info!(port, "Service already running");
            return StartOutcome::AlreadyRunning;
        }

        let args = self.config.launch_args(port);
        info!(
            port,
            runtime = %self.config.runtime,
            jar = %self.config.jar_path().display(),
            "Launching service"
        );

        match self
            .table
            .spawn(OsStr::new(&self.config.runtime), &args)
            .await
        {
            Ok(handle) => {
                let pid = handle.pid();
                info!(port, pid, "Service launched");
                let previous = self.handles.lock().insert(port, handle);
                drop(previous);

                // Other starters must not run their check before the port is bound.
                let timeout = self.config.startup_timeout;
                if lock.is_some() && !timeout.is_zero() && !self.await_listener(port).await {
                    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!(port, pid, timeout_ms, "Service not listening yet, releasing start lock");
                }
                drop(lock);
                StartOutcome::Launched(pid)
            }
            Err(e) => {
                error!(port, error = %e, "Failed to launch service");
                StartOutcome::Failed
            }
        }
    }

    /// Terminates every matching process listening on `port`.
    ///
    /// Returns the number of processes signalled. Never fails.
    pub async fn stop(&self, port: u16) -> usize {
        let processes = match self.table.list_processes_on_port(port).await {
            Ok(processes) => processes,
            Err(e) => {
                warn!(port, error = %e, "Failed to query process table");
                return 0;
            }
        };

        let mut signalled = 0;
        for process in processes
            .iter()
            .filter(|process| process.matches(&self.config.process_marker))
        {
            match self.table.terminate(process.pid).await {
                Ok(()) => {
                    info!(port, pid = process.pid, name = %process.name, "Service process killed");
                    signalled += 1;
                }
                Err(e) => warn!(port, pid = process.pid, error = %e, "Failed to kill process"),
            }
        }

        let handle = self.handles.lock().remove(&port);
        drop(handle);

        if signalled == 0 {
            debug!(port, "No service process to stop");
        }
        signalled
    }

    /// Starts the service on the configured port.
    pub async fn ensure_started(&self) -> StartOutcome {
        self.start(self.config.port).await
    }

    /// Stops the service on the configured port.
    pub async fn shutdown(&self) -> usize {
        self.stop(self.config.port).await
    }

    /// Pid of the process this supervisor launched on `port`, if any.
    #[must_use]
    pub fn launched_pid(&self, port: u16) -> Option<u32> {
        self.handles.lock().get(&port).and_then(ProcessHandle::pid)
    }

    /// Polls until the service listens on `port` or the startup timeout
    /// elapses.
    async fn await_listener(&self, port: u16) -> bool {
        let deadline = Instant::now() + self.config.startup_timeout;
        loop {
            if self.is_running(port).await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(LISTEN_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    fn debounce_delay(&self) -> Duration {
        let max_ms = u64::try_from(self.config.max_slow_start_delay.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    /// Takes the start lock for `port`. Lock failures are logged and the
    /// start continues unlocked.
    async fn acquire_lock(&self, port: u16) -> Option<File> {
        let path = self.config.lock_path(port)?;
        let lock_file = path.display().to_string();

        let locked = spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            file.lock()?;
            Ok(file)
        })
        .await;

        match locked {
            Ok(Ok(file)) => {
                debug!(port, path = %lock_file, "Start lock acquired");
                Some(file)
            }
            Ok(Err(e)) => {
                warn!(port, path = %lock_file, error = %e, "Failed to take start lock");
                None
            }
            Err(e) => {
                warn!(port, error = %e, "Start lock task failed");
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::ffi::OsString;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::task::JoinSet;

    use crate::error::{Error, Result};
    use crate::service::process_table::ProcessInfo;

    // ------------------------------------------------------------------------
    // FakeProcessTable
    // ------------------------------------------------------------------------

    #[derive(Debug, Default)]
    struct FakeState {
        listening: FxHashMap<u16, Vec<ProcessInfo>>,
        spawns: Vec<Vec<OsString>>,
        terminated: Vec<u32>,
        next_pid: u32,
        fail_spawn: bool,
        fail_query: bool,
        /// Spawned processes start listening after this delay; `None` means
        /// immediately, `Some(Duration::MAX)` never.
        listen_delay: Option<Duration>,
    }

    #[derive(Debug, Default)]
    struct FakeProcessTable {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeProcessTable {
        fn with_listener(port: u16, pid: u32, name: &str) -> Self {
            let table = Self::default();
            table
                .state
                .lock()
                .listening
                .entry(port)
                .or_default()
                .push(ProcessInfo::new(pid, name));
            table
        }

        fn spawn_count(&self) -> usize {
            self.state.lock().spawns.len()
        }

        fn terminated(&self) -> Vec<u32> {
            self.state.lock().terminated.clone()
        }
    }

    #[async_trait]
    impl ProcessTable for FakeProcessTable {
        async fn list_processes_on_port(&self, port: u16) -> Result<Vec<ProcessInfo>> {
            let state = self.state.lock();
            if state.fail_query {
                return Err(Error::process_query("lsof exploded"));
            }
            Ok(state.listening.get(&port).cloned().unwrap_or_default())
        }

        async fn terminate(&self, pid: u32) -> Result<()> {
            let mut state = self.state.lock();
            state.terminated.push(pid);
            for processes in state.listening.values_mut() {
                processes.retain(|process| process.pid != pid);
            }
            Ok(())
        }

        async fn spawn(&self, program: &OsStr, args: &[OsString]) -> Result<ProcessHandle> {
            let mut state = self.state.lock();
            if state.fail_spawn {
                return Err(Error::process_launch_failed(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no runtime",
                )));
            }

            state.spawns.push(args.to_vec());
            state.next_pid += 1;
            let pid = 1000 + state.next_pid;

            let port = args
                .iter()
                .position(|arg| arg == "-r")
                .and_then(|i| args.get(i + 1))
                .and_then(|port| port.to_str()?.parse::<u16>().ok());
            if let Some(port) = port {
                let process = ProcessInfo::new(pid, program.to_string_lossy().into_owned());
                match state.listen_delay {
                    None => state.listening.entry(port).or_default().push(process),
                    Some(delay) if delay == Duration::MAX => {}
                    Some(delay) => {
                        let shared = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            sleep(delay).await;
                            shared.lock().listening.entry(port).or_default().push(process);
                        });
                    }
                }
            }

            Ok(ProcessHandle::external(pid))
        }
    }

    fn quick_config() -> ServiceConfig {
        ServiceConfig::new()
            .with_server_path("/opt/galen")
            .with_max_slow_start_delay(Duration::ZERO)
    }

    // ------------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_stop_without_process_is_noop() {
        let supervisor = ServiceSupervisor::new(quick_config(), FakeProcessTable::default());

        assert_eq!(supervisor.stop(9092).await, 0);
        assert_eq!(supervisor.stop(9092).await, 0);
        assert!(supervisor.table().terminated().is_empty());
    }

    #[tokio::test]
    async fn test_stop_kills_only_marked_processes() {
        let table = FakeProcessTable::with_listener(9092, 100, "java");
        table
            .state
            .lock()
            .listening
            .entry(9092)
            .or_default()
            .push(ProcessInfo::new(200, "python"));
        let supervisor = ServiceSupervisor::new(quick_config(), table);

        assert_eq!(supervisor.stop(9092).await, 1);
        assert_eq!(supervisor.table().terminated(), vec![100]);
        assert!(!supervisor.is_running(9092).await);
    }

    #[tokio::test]
    async fn test_is_running_requires_marker() {
        let supervisor = ServiceSupervisor::new(
            quick_config(),
            FakeProcessTable::with_listener(9092, 7, "nginx"),
        );
        assert!(!supervisor.is_running(9092).await);
        assert!(!supervisor.is_running(9091).await);
    }

    #[tokio::test]
    async fn test_start_skips_running_service() {
        let supervisor = ServiceSupervisor::new(
            quick_config(),
            FakeProcessTable::with_listener(9092, 7, "java"),
        );

        assert_eq!(supervisor.start(9092).await, StartOutcome::AlreadyRunning);
        assert_eq!(supervisor.table().spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_start_launches_with_port_argument() {
        let supervisor = ServiceSupervisor::new(quick_config(), FakeProcessTable::default());

        let outcome = supervisor.start(9091).await;
        assert_eq!(outcome, StartOutcome::Launched(Some(1001)));
        assert_eq!(supervisor.launched_pid(9091), Some(1001));
        assert!(supervisor.is_running(9091).await);

        let spawns = supervisor.table().state.lock().spawns.clone();
        assert_eq!(spawns.len(), 1);
        assert_eq!(spawns[0], quick_config().launch_args(9091));
    }

    #[tokio::test]
    async fn test_start_failure_is_swallowed() {
        let table = FakeProcessTable::default();
        table.state.lock().fail_spawn = true;
        let supervisor = ServiceSupervisor::new(quick_config(), table);

        let outcome = supervisor.start(9092).await;
        assert_eq!(outcome, StartOutcome::Failed);
        assert!(!outcome.is_available());
        assert!(supervisor.launched_pid(9092).is_none());
    }

    #[tokio::test]
    async fn test_query_failure_is_swallowed() {
        let table = FakeProcessTable::default();
        table.state.lock().fail_query = true;
        let supervisor = ServiceSupervisor::new(quick_config(), table);

        assert!(!supervisor.is_running(9092).await);
        assert_eq!(supervisor.stop(9092).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_starts_end_running() {
        let config = quick_config().with_max_slow_start_delay(Duration::from_millis(20));
        let supervisor = Arc::new(ServiceSupervisor::new(config, FakeProcessTable::default()));

        let mut starts = JoinSet::new();
        for _ in 0..8 {
            let supervisor = Arc::clone(&supervisor);
            starts.spawn(async move { supervisor.ensure_started().await });
        }
        while let Some(outcome) = starts.join_next().await {
            assert!(outcome.unwrap().is_available());
        }

        assert!(supervisor.is_running(9092).await);
        let spawns = supervisor.table().spawn_count();
        assert!((1..=8).contains(&spawns));
    }

    #[tokio::test]
    async fn test_lock_file_serializes_starts() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config()
            .with_max_slow_start_delay(Duration::from_millis(5))
            .with_lock_dir(dir.path());
        let supervisor = Arc::new(ServiceSupervisor::new(config, FakeProcessTable::default()));

        let mut starts = JoinSet::new();
        for _ in 0..4 {
            let supervisor = Arc::clone(&supervisor);
            starts.spawn(async move { supervisor.start(9092).await });
        }
        while let Some(outcome) = starts.join_next().await {
            outcome.unwrap();
        }

        assert_eq!(supervisor.table().spawn_count(), 1);
        assert!(dir.path().join("thrift-webdriver-9092.lock").exists());
    }

    #[tokio::test]
    async fn test_lock_held_until_service_listens() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config()
            .with_lock_dir(dir.path())
            .with_startup_timeout(Duration::from_secs(5));
        let table = FakeProcessTable::default();
        table.state.lock().listen_delay = Some(Duration::from_millis(150));
        let supervisor = Arc::new(ServiceSupervisor::new(config, table));

        let mut starts = JoinSet::new();
        for _ in 0..4 {
            let supervisor = Arc::clone(&supervisor);
            starts.spawn(async move { supervisor.start(9092).await });
        }
        let mut launched = 0;
        while let Some(outcome) = starts.join_next().await {
            if matches!(outcome.unwrap(), StartOutcome::Launched(_)) {
                launched += 1;
            }
        }

        assert_eq!(launched, 1);
        assert_eq!(supervisor.table().spawn_count(), 1);
        assert!(supervisor.is_running(9092).await);
    }

    #[tokio::test]
    async fn test_startup_timeout_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config()
            .with_lock_dir(dir.path())
            .with_startup_timeout(Duration::from_millis(50));
        let table = FakeProcessTable::default();
        table.state.lock().listen_delay = Some(Duration::MAX);
        let supervisor = ServiceSupervisor::new(config, table);

        let first = supervisor.start(9092).await;
        let second = supervisor.start(9092).await;

        assert_eq!(first, StartOutcome::Launched(Some(1001)));
        assert_eq!(second, StartOutcome::Launched(Some(1002)));
        assert_eq!(supervisor.table().spawn_count(), 2);
    }

    #[tokio::test]
    async fn test_unlocked_start_does_not_wait() {
        let config = quick_config().with_startup_timeout(Duration::from_secs(60));
        let table = FakeProcessTable::default();
        table.state.lock().listen_delay = Some(Duration::MAX);
        let supervisor = ServiceSupervisor::new(config, table);

        let outcome = tokio::time::timeout(Duration::from_secs(5), supervisor.start(9092))
            .await
            .unwrap();
        assert_eq!(outcome, StartOutcome::Launched(Some(1001)));
        assert!(!supervisor.is_running(9092).await);
    }

    #[tokio::test]
    async fn test_shutdown_after_start() {
        let supervisor = ServiceSupervisor::new(quick_config(), FakeProcessTable::default());

        supervisor.ensure_started().await;
        assert_eq!(supervisor.shutdown().await, 1);
        assert!(!supervisor.is_running(9092).await);
        assert!(supervisor.launched_pid(9092).is_none());
    }
}
