//! Sidecar service configuration.
//!
//! Describes how the RPC service is launched and recognized in the process
//! table. Every value is explicit; nothing is read from global state.
//!
//! # Example
//!
//! ```ignore
//! use thrift_webdriver::ServiceConfig;
//!
//! let config = ServiceConfig::new()
//!     .with_server_path("/opt/galen")
//!     .with_port(9091)
//!     .with_arg("-Xmx512m");
//!
//! let args = config.launch_args(config.port);
//! // ["-Xmx512m", "-jar", "/opt/galen/galen-api-server.jar", "-r", "9091"]
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::DEFAULT_PORT;

// ============================================================================
// Constants
// ============================================================================

/// Default runtime used to launch the service.
pub const DEFAULT_RUNTIME: &str = "java";

/// Default jar file name.
pub const DEFAULT_JAR_NAME: &str = "galen-api-server.jar";

/// Default upper bound of the start debounce.
pub const DEFAULT_MAX_SLOW_START_DELAY: Duration = Duration::from_secs(1);

/// Default wait for a launched service to listen while the start lock is held.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ServiceConfig
// ============================================================================

/// Launch and detection settings for the sidecar service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Program that runs the jar.
    pub runtime: String,

    /// Directory holding the jar.
    pub server_path: PathBuf,

    /// Jar file name inside `server_path`.
    pub jar_name: String,

    /// Port the service listens on.
    pub port: u16,

    /// Substring of the process name that identifies the service.
    pub process_marker: String,

    /// Upper bound of the random delay applied before a start check.
    #[serde(rename = "max_slow_start_delay_ms", with = "millis")]
    pub max_slow_start_delay: Duration,

    /// Directory for the start lock file. `None` disables the lock.
    pub lock_dir: Option<PathBuf>,

    /// How long a locked start keeps the lock while waiting for the
    /// launched service to listen. Zero releases it right after spawning.
    #[serde(rename = "startup_timeout_ms", with = "millis")]
    pub startup_timeout: Duration,

    /// Runtime options placed before `-jar`.
    pub extra_args: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ServiceConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runtime: DEFAULT_RUNTIME.to_string(),
            server_path: PathBuf::new(),
            jar_name: DEFAULT_JAR_NAME.to_string(),
            port: DEFAULT_PORT,
            process_marker: DEFAULT_RUNTIME.to_string(),
            max_slow_start_delay: DEFAULT_MAX_SLOW_START_DELAY,
            lock_dir: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            extra_args: Vec::new(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ServiceConfig {
    /// Sets the launch runtime.
    #[inline]
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Sets the directory holding the jar.
    #[inline]
    #[must_use]
    pub fn with_server_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_path = path.into();
        self
    }

    /// Sets the jar file name.
    #[inline]
    #[must_use]
    pub fn with_jar_name(mut self, name: impl Into<String>) -> Self {
        self.jar_name = name.into();
        self
    }

    /// Sets the service port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the process name marker.
    #[inline]
    #[must_use]
    pub fn with_process_marker(mut self, marker: impl Into<String>) -> Self {
        self.process_marker = marker.into();
        self
    }

    /// Sets the debounce upper bound.
    #[inline]
    #[must_use]
    pub fn with_max_slow_start_delay(mut self, delay: Duration) -> Self {
        self.max_slow_start_delay = delay;
        self
    }

    /// Enables the start lock file in the given directory.
    #[inline]
    #[must_use]
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    /// Sets the listen wait of a locked start.
    #[inline]
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Adds a runtime option.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl ServiceConfig {
    /// Full path of the jar.
    #[must_use]
    pub fn jar_path(&self) -> PathBuf {
        self.server_path.join(&self.jar_name)
    }

    /// Arguments passed to the runtime to serve on `port`.
    #[must_use]
    pub fn launch_args(&self, port: u16) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(4 + self.extra_args.len());
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push("-jar".into());
        args.push(self.jar_path().into_os_string());
        args.push("-r".into());
        args.push(port.to_string().into());
        args
    }

    /// Lock file guarding check-and-spawn on `port`, if locking is enabled.
    #[must_use]
    pub fn lock_path(&self, port: u16) -> Option<PathBuf> {
        self.lock_dir
            .as_ref()
            .map(|dir| dir.join(format!("thrift-webdriver-{port}.lock")))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for port 0 or an empty runtime, jar name
    /// or process marker.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config("Service port must be greater than zero"));
        }
        if self.runtime.trim().is_empty() {
            return Err(Error::config("Service runtime must not be empty"));
        }
        if self.jar_name.trim().is_empty() {
            return Err(Error::config("Service jar name must not be empty"));
        }
        if self.process_marker.trim().is_empty() {
            return Err(Error::config("Process marker must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================
