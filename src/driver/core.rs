//! Remote driver.
//!
//! [`RemoteDriver`] is the caller-facing WebDriver. It holds a
//! [`RpcCommandExecutor`] and, when auto-start is enabled, the
//! [`ServiceSupervisor`] that launched the sidecar.
//!
//! # Example
//!
//! ```no_run
//! use thrift_webdriver::{RemoteDriver, Result};
//!
//! # async fn example() -> Result<()> {
//! let mut driver = RemoteDriver::builder()
//!     .remote_url("http://127.0.0.1:4444/wd/hub")
//!     .capability("browserName", "firefox")
//!     .build()
//!     .await?;
//!
//! driver.get("https://example.com").await?;
//! let title = driver.title().await?;
//! println!("Page title: {title:?}");
//!
//! driver.quit().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, error, info};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::DriverCommand;
use crate::service::ServiceSupervisor;

use super::adapter::CommandResult;
use super::builder::DriverBuilder;
use super::executor::{CommandExecutor, RpcCommandExecutor};

// ============================================================================
// RemoteDriver
// ============================================================================

/// WebDriver whose commands travel through the RPC service.
pub struct RemoteDriver {
    executor: RpcCommandExecutor,
    remote_url: Url,
    capabilities: Map<String, Value>,
    supervisor: Option<Arc<ServiceSupervisor>>,
}

// ============================================================================
// RemoteDriver - Display
// ============================================================================

impl fmt::Debug for RemoteDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteDriver")
            .field("remote_url", &self.remote_url.as_str())
            .field("session_id", &self.session_id())
            .field("managed_service", &self.supervisor.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RemoteDriver - Construction
// ============================================================================

impl RemoteDriver {
    /// Creates a configuration builder for the driver.
    #[inline]
    #[must_use]
    pub fn builder() -> DriverBuilder {
        DriverBuilder::new()
    }

    /// Runs the session handshake on a fresh executor.
    ///
    /// On failure the service is shut down if it turns out to be idle, the
    /// connection is released, and the original error is returned.
    pub(crate) async fn start_session(
        mut executor: RpcCommandExecutor,
        remote_url: Url,
        capabilities: Map<String, Value>,
        supervisor: Option<Arc<ServiceSupervisor>>,
    ) -> Result<Self> {
        match Self::handshake(&mut executor, &remote_url, &capabilities).await {
            Ok(session_id) => {
                executor.bind_session(session_id.clone())?;
                info!(session_id = %session_id, remote_url = %remote_url, "Session started");
                Ok(Self {
                    executor,
                    remote_url,
                    capabilities,
                    supervisor,
                })
            }
            Err(e) => {
                error!(remote_url = %remote_url, error = %e, "Session handshake failed");
                if executor.quit_service_if_inactive().await {
                    debug!("Idle service shut down after failed handshake");
                }
                if let Err(close) = executor.release().await {
                    debug!(error = %close, "Failed to release connection");
                }
                Err(e)
            }
        }
    }

    async fn handshake(
        executor: &mut RpcCommandExecutor,
        remote_url: &Url,
        capabilities: &Map<String, Value>,
    ) -> Result<SessionId> {
        executor
            .service()
            .await?
            .initialize(remote_url.as_str())
            .await?;

        let params = json!({ "desiredCapabilities": capabilities });
        let result = executor
            .execute(DriverCommand::NewSession.name(), &params)
            .await?;

        if !result.is_success() {
            return Err(Error::session_not_created(
                result.status,
                format!("newSession returned status {}", result.status),
            ));
        }

        result
            .session_id
            .as_deref()
            .and_then(SessionId::new)
            .ok_or_else(|| Error::session_not_created(result.status, "Response carried no session id"))
    }
}

// ============================================================================
// RemoteDriver - Accessors
// ============================================================================

impl RemoteDriver {
    /// Returns the bound session id.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.executor.session_id()
    }

    /// Returns the WebDriver hub URL given to the service.
    #[inline]
    #[must_use]
    pub fn remote_url(&self) -> &Url {
        &self.remote_url
    }

    /// Returns the requested capabilities.
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> &Map<String, Value> {
        &self.capabilities
    }

    /// Returns the supervisor of an auto-started service.
    #[inline]
    #[must_use]
    pub fn supervisor(&self) -> Option<&Arc<ServiceSupervisor>> {
        self.supervisor.as_ref()
    }

    /// Returns the command executor.
    #[inline]
    #[must_use]
    pub fn executor(&self) -> &RpcCommandExecutor {
        &self.executor
    }
}

// ============================================================================
// RemoteDriver - Commands
// ============================================================================

impl RemoteDriver {
    /// Executes a WebDriver command by name.
    ///
    /// # Errors
    ///
    /// - [`Error::UnrecognizedCommand`] before any I/O for unknown names
    /// - [`Error::RemoteWebDriver`] with the remote message on failure
    /// - Transport errors from the connection
    pub async fn execute(&mut self, command: &str, params: Value) -> Result<CommandResult> {
        self.executor.execute(command, &params).await
    }

    /// Navigates to a URL.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn get(&mut self, url: &str) -> Result<()> {
        self.execute(DriverCommand::Get.name(), json!({ "url": url }))
            .await?;
        Ok(())
    }

    /// Returns the URL of the current page.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn current_url(&mut self) -> Result<Option<String>> {
        let result = self
            .execute(DriverCommand::GetCurrentUrl.name(), json!({}))
            .await?;
        Ok(result.raw_str().map(str::to_owned))
    }

    /// Returns the title of the current page.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn title(&mut self) -> Result<Option<String>> {
        let result = self
            .execute(DriverCommand::GetTitle.name(), json!({}))
            .await?;
        Ok(result.raw_str().map(str::to_owned))
    }

    /// Validates the current page against layout specs.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotBound`] without a session
    /// - [`Error::SpecNotFound`] if the service cannot find the specs
    pub async fn check_layout(
        &mut self,
        test_name: &str,
        specs: &str,
        included_tags: &[String],
        excluded_tags: &[String],
    ) -> Result<i32> {
        let session_id = self
            .executor
            .session_id()
            .cloned()
            .ok_or(Error::SessionNotBound)?;

        self.executor
            .service()
            .await?
            .check_layout(
                test_name,
                session_id.as_str(),
                specs,
                included_tags,
                excluded_tags,
            )
            .await
    }

    /// Writes the layout report into a folder on the service host.
    ///
    /// # Errors
    ///
    /// Returns transport or application errors from the call.
    pub async fn generate_report(&mut self, report_folder_path: &str) -> Result<()> {
        self.executor
            .service()
            .await?
            .generate_report(report_folder_path)
            .await
    }

    /// Returns the number of sessions the service holds.
    ///
    /// # Errors
    ///
    /// Returns transport or application errors from the call.
    pub async fn active_drivers(&mut self) -> Result<i32> {
        self.executor.service().await?.active_drivers().await
    }

    /// Ends the session and releases the connection.
    ///
    /// The connection is released even if the `quit` command fails; the
    /// first error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error of the `quit` command or of closing the connection.
    pub async fn quit(mut self) -> Result<()> {
        let session_id = self.session_id().cloned();
        let quit = self
            .execute(DriverCommand::Quit.name(), json!({}))
            .await
            .map(|_| ());
        let release = self.executor.quit().await;

        match &quit {
            Ok(()) => info!(session_id = ?session_id, "Session quit"),
            Err(e) => debug!(session_id = ?session_id, error = %e, "Quit command failed"),
        }
        quit.and(release)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::protocol::{Response, ResponseValue};
    use crate::transport::RemoteService;

    #[derive(Debug, Default)]
    struct Script {
        new_session: Option<Response>,
        quit_fails: bool,
        active: i32,
        calls: Vec<String>,
    }

    struct ScriptedService(Arc<Mutex<Script>>);

    #[async_trait]
    impl RemoteService for ScriptedService {
        async fn initialize(&mut self, remote_server_addr: &str) -> Result<()> {
            self.0
                .lock()
                .calls
                .push(format!("initialize {remote_server_addr}"));
            Ok(())
        }

        async fn execute(
            &mut self,
            session_id: Option<&str>,
            command: &str,
            _params: &str,
        ) -> Result<Response> {
            let mut script = self.0.lock();
            script
                .calls
                .push(format!("{command} {}", session_id.unwrap_or("-")));
            match command {
                "newSession" => Ok(script.new_session.clone().unwrap_or_default()),
                "quit" if script.quit_fails => Err(Error::remote_webdriver("already gone")),
                "getTitle" => Ok(Response {
                    value: Some(ResponseValue::String("Example Domain".into())),
                    ..Response::default()
                }),
                _ => Ok(Response::default()),
            }
        }

        async fn check_layout(
            &mut self,
            test_name: &str,
            webdriver_session_id: &str,
            _specs: &str,
            _included_tags: &[String],
            _excluded_tags: &[String],
        ) -> Result<i32> {
            self.0
                .lock()
                .calls
                .push(format!("check_layout {test_name} {webdriver_session_id}"));
            Ok(1)
        }

        async fn generate_report(&mut self, _report_folder_path: &str) -> Result<()> {
            Ok(())
        }

        async fn active_drivers(&mut self) -> Result<i32> {
            let mut script = self.0.lock();
            script.calls.push("active_drivers".into());
            Ok(script.active)
        }

        async fn shut_service(&mut self) -> Result<()> {
            self.0.lock().calls.push("shut_service".into());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.0.lock().calls.push("close".into());
            Ok(())
        }
    }

    fn created(id: &str) -> Response {
        Response {
            session_id: Some(id.into()),
            status: Some(0),
            state: Some("success".into()),
            ..Response::default()
        }
    }

    async fn start(script: Script) -> (Result<RemoteDriver>, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(script));
        let executor = RpcCommandExecutor::new(Box::new(ScriptedService(Arc::clone(&script))));
        let url = Url::parse("http://hub:4444/wd/hub").unwrap();
        let mut capabilities = Map::new();
        capabilities.insert("browserName".into(), json!("firefox"));

        let driver = RemoteDriver::start_session(executor, url, capabilities, None).await;
        (driver, script)
    }

    #[tokio::test]
    async fn test_handshake_binds_session() {
        let (driver, script) = start(Script {
            new_session: Some(created("abc123")),
            ..Script::default()
        })
        .await;

        let driver = driver.unwrap();
        assert_eq!(driver.session_id().map(SessionId::as_str), Some("abc123"));
        assert_eq!(driver.capabilities()["browserName"], json!("firefox"));
        assert!(driver.supervisor().is_none());
        assert_eq!(
            script.lock().calls,
            vec!["initialize http://hub:4444/wd/hub", "newSession -"]
        );
    }

    #[tokio::test]
    async fn test_failed_handshake_shuts_idle_service() {
        let (driver, script) = start(Script {
            new_session: Some(Response {
                status: Some(13),
                ..Response::default()
            }),
            ..Script::default()
        })
        .await;

        let err = driver.unwrap_err();
        assert!(matches!(err, Error::SessionNotCreated { status: 13, .. }));
        assert_eq!(
            script.lock().calls[2..],
            ["active_drivers", "shut_service", "close"]
        );
    }

    #[tokio::test]
    async fn test_failed_handshake_keeps_busy_service() {
        let (driver, script) = start(Script {
            new_session: Some(Response::default()),
            active: 2,
            ..Script::default()
        })
        .await;

        assert!(driver.is_err());
        assert_eq!(script.lock().calls[2..], ["active_drivers", "close"]);
    }

    #[tokio::test]
    async fn test_commands_use_bound_session() {
        let (driver, script) = start(Script {
            new_session: Some(created("abc123")),
            ..Script::default()
        })
        .await;
        let mut driver = driver.unwrap();

        assert_eq!(driver.title().await.unwrap().as_deref(), Some("Example Domain"));
        assert_eq!(
            driver.check_layout("home", "home.spec", &[], &[]).await.unwrap(),
            1
        );
        driver.quit().await.unwrap();

        assert_eq!(
            script.lock().calls[2..],
            ["getTitle abc123", "check_layout home abc123", "quit abc123", "close"]
        );
    }

    #[tokio::test]
    async fn test_quit_releases_even_on_failure() {
        let (driver, script) = start(Script {
            new_session: Some(created("abc123")),
            quit_fails: true,
            ..Script::default()
        })
        .await;

        let err = driver.unwrap().quit().await.unwrap_err();
        assert_eq!(err.to_string(), "already gone");
        assert_eq!(script.lock().calls.last().map(String::as_str), Some("close"));
    }
}
