//! Command execution over the RPC service.
//!
//! [`CommandExecutor`] is the pluggable command transport of a driver.
//! [`RpcCommandExecutor`] implements it on top of a [`RemoteService`] and
//! owns the session state machine:
//!
//! ```text
//! Unbound ──bind_session(id)──► Bound(id)
//! ```
//!
//! The transition happens once. Binding a different id afterwards fails
//! with [`Error::SessionAlreadyBound`].
//!
//! # Execution Steps
//!
//! 1. Look the command name up in [`DriverCommand`], failing before any I/O
//! 2. Serialize the parameters to JSON
//! 3. Call `execute` on the service with the bound session id
//! 4. Adapt the reply with the configured [`ResponseAdapter`]

// ============================================================================
// Imports
// ============================================================================

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::DriverCommand;
use crate::transport::RemoteService;

use super::adapter::{CommandResult, ResponseAdapter};

// ============================================================================
// Types
// ============================================================================

/// A service connection shared by several drivers.
///
/// The connection is closed by the last driver to release it.
pub type SharedService = Arc<AsyncMutex<Box<dyn RemoteService>>>;

/// Wraps a service for sharing.
#[must_use]
pub fn share_service(service: Box<dyn RemoteService>) -> SharedService {
    Arc::new(AsyncMutex::new(service))
}

// ============================================================================
// CommandExecutor
// ============================================================================

/// Executes WebDriver commands.
#[async_trait]
pub trait CommandExecutor: Send {
    /// Executes a command by name with JSON parameters.
    async fn execute(&mut self, command: &str, params: &Value) -> Result<CommandResult>;

    /// Releases the underlying transport.
    async fn quit(&mut self) -> Result<()>;
}

// ============================================================================
// SessionState
// ============================================================================

/// Session binding of an executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No session yet.
    #[default]
    Unbound,
    /// Bound to a session for the executor's lifetime.
    Bound(SessionId),
}

impl SessionState {
    /// Returns the bound session id.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Unbound => None,
            Self::Bound(id) => Some(id),
        }
    }

    /// Returns `true` once a session is bound.
    #[inline]
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }
}

// ============================================================================
// ServiceLink
// ============================================================================

/// How an executor holds its service connection.
enum ServiceLink {
    Owned(Box<dyn RemoteService>),
    Shared(SharedService),
}

/// Exclusive access to the service for one or more calls.
pub enum ServiceGuard<'a> {
    /// Connection owned by the executor.
    Owned(&'a mut (dyn RemoteService + 'static)),
    /// Locked shared connection.
    Shared(AsyncMutexGuard<'a, Box<dyn RemoteService>>),
}

impl Deref for ServiceGuard<'_> {
    type Target = dyn RemoteService;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(service) => &**service,
            Self::Shared(guard) => &***guard,
        }
    }
}

impl DerefMut for ServiceGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(service) => &mut **service,
            Self::Shared(guard) => &mut ***guard,
        }
    }
}

// ============================================================================
// RpcCommandExecutor
// ============================================================================

/// Command executor backed by the RPC service.
pub struct RpcCommandExecutor {
    /// `None` once released.
    link: Option<ServiceLink>,
    session: SessionState,
    adapter: ResponseAdapter,
}

impl std::fmt::Debug for RpcCommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = match self.link {
            Some(ServiceLink::Owned(_)) => "owned",
            Some(ServiceLink::Shared(_)) => "shared",
            None => "released",
        };
        f.debug_struct("RpcCommandExecutor")
            .field("link", &link)
            .field("session", &self.session)
            .field("adapter", &self.adapter)
            .finish()
    }
}

impl RpcCommandExecutor {
    /// Creates an executor that owns its connection.
    #[must_use]
    pub fn new(service: Box<dyn RemoteService>) -> Self {
        Self::from_link(ServiceLink::Owned(service))
    }

    /// Creates an executor on a shared connection.
    #[must_use]
    pub fn shared(service: SharedService) -> Self {
        Self::from_link(ServiceLink::Shared(service))
    }

    fn from_link(link: ServiceLink) -> Self {
        Self {
            link: Some(link),
            session: SessionState::Unbound,
            adapter: ResponseAdapter::default(),
        }
    }

    /// Sets the response adapter.
    #[inline]
    #[must_use]
    pub fn with_adapter(mut self, adapter: ResponseAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    /// Returns the session state.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Returns the bound session id.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.session_id()
    }

    /// Returns the response adapter.
    #[inline]
    #[must_use]
    pub fn adapter(&self) -> ResponseAdapter {
        self.adapter
    }

    /// Returns `true` once the connection was released.
    #[inline]
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.link.is_none()
    }

    /// Binds the session id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionAlreadyBound`] if a different id is bound.
    pub fn bind_session(&mut self, id: SessionId) -> Result<()> {
        match &self.session {
            SessionState::Unbound => {
                debug!(session_id = %id, "Session bound");
                self.session = SessionState::Bound(id);
                Ok(())
            }
            SessionState::Bound(current) if *current == id => Ok(()),
            SessionState::Bound(current) => Err(Error::SessionAlreadyBound {
                current: current.clone(),
                attempted: id,
            }),
        }
    }

    /// Locks the service for direct calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] after [`Self::release`].
    pub async fn service(&mut self) -> Result<ServiceGuard<'_>> {
        match self.link.as_mut() {
            Some(ServiceLink::Owned(service)) => Ok(ServiceGuard::Owned(&mut **service)),
            Some(ServiceLink::Shared(service)) => Ok(ServiceGuard::Shared(service.lock().await)),
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Releases the connection.
    ///
    /// An owned connection is closed. A shared one is closed only when no
    /// other executor holds it. Repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the error of closing the connection.
    pub async fn release(&mut self) -> Result<()> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };

        match link {
            ServiceLink::Owned(mut service) => service.close().await,
            // The clone is given up first, so exactly one releaser unwraps.
            ServiceLink::Shared(service) => match Arc::into_inner(service) {
                Some(service) => service.into_inner().close().await,
                None => {
                    debug!("Shared connection still in use, leaving it open");
                    Ok(())
                }
            },
        }
    }

    /// Shuts the service down if it holds no sessions. Errors are logged.
    pub async fn quit_service_if_inactive(&mut self) -> bool {
        let outcome = match self.service().await {
            Ok(mut service) => service.quit_service_if_inactive().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(shut) => shut,
            Err(e) => {
                debug!(error = %e, "Idle service check failed");
                false
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for RpcCommandExecutor {
    async fn execute(&mut self, command: &str, params: &Value) -> Result<CommandResult> {
        let command = DriverCommand::parse(command)?;

        let session_id = match self.session.session_id() {
            Some(id) => Some(id.clone()),
            None if command.is_session_free() => None,
            None => return Err(Error::SessionNotBound),
        };

        let payload = serde_json::to_string(params)?;
        let adapter = self.adapter;
        trace!(
            command = command.name(),
            session_id = session_id.as_ref().map(SessionId::as_str),
            "Executing command"
        );

        let mut service = self.service().await?;
        let outcome = service
            .execute(
                session_id.as_ref().map(SessionId::as_str),
                command.name(),
                &payload,
            )
            .await;
        drop(service);

        match outcome {
            Ok(response) => Ok(adapter.adapt(response)),
            Err(e) => {
                if e.is_remote_failure() {
                    debug!(command = command.name(), error = %e, "Command failed remotely");
                }
                Err(e)
            }
        }
    }

    async fn quit(&mut self) -> Result<()> {
        self.release().await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;

    use crate::protocol::{Response, ResponseValue};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Call {
        session_id: Option<String>,
        command: String,
        params: String,
    }

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Vec<Call>,
        closes: usize,
    }

    struct FakeService {
        recorder: Arc<Mutex<Recorder>>,
        reply: fn(&str) -> Result<Response>,
    }

    #[async_trait]
    impl RemoteService for FakeService {
        async fn initialize(&mut self, _remote_server_addr: &str) -> Result<()> {
            Ok(())
        }

        async fn execute(
            &mut self,
            session_id: Option<&str>,
            command: &str,
            params: &str,
        ) -> Result<Response> {
            self.recorder.lock().calls.push(Call {
                session_id: session_id.map(str::to_owned),
                command: command.to_owned(),
                params: params.to_owned(),
            });
            (self.reply)(command)
        }

        async fn check_layout(
            &mut self,
            _test_name: &str,
            _webdriver_session_id: &str,
            _specs: &str,
            _included_tags: &[String],
            _excluded_tags: &[String],
        ) -> Result<i32> {
            Ok(0)
        }

        async fn generate_report(&mut self, _report_folder_path: &str) -> Result<()> {
            Ok(())
        }

        async fn active_drivers(&mut self) -> Result<i32> {
            Ok(1)
        }

        async fn shut_service(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.recorder.lock().closes += 1;
            Ok(())
        }
    }

    fn set_reply(_command: &str) -> Result<Response> {
        Ok(Response {
            value: Some(ResponseValue::set(["a", "b"])),
            session_id: Some("abc123".into()),
            status: Some(0),
            state: Some("success".into()),
        })
    }

    fn boom_reply(_command: &str) -> Result<Response> {
        Err(Error::remote_webdriver("boom"))
    }

    fn executor(reply: fn(&str) -> Result<Response>) -> (RpcCommandExecutor, Arc<Mutex<Recorder>>) {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let service = FakeService {
            recorder: Arc::clone(&recorder),
            reply,
        };
        (RpcCommandExecutor::new(Box::new(service)), recorder)
    }

    fn session(id: &str) -> SessionId {
        SessionId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_unrecognized_command_sends_nothing() {
        let (mut executor, recorder) = executor(set_reply);
        executor.bind_session(session("abc123")).unwrap();

        let err = executor
            .execute("teleport", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnrecognizedCommand { ref command } if command == "teleport"));
        assert!(recorder.lock().calls.is_empty());
    }

    #[tokio::test]
    async fn test_unbound_session_command_sends_nothing() {
        let (mut executor, recorder) = executor(set_reply);

        let err = executor.execute("getTitle", &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotBound));
        assert!(recorder.lock().calls.is_empty());
    }

    #[tokio::test]
    async fn test_new_session_sent_without_session_id() {
        let (mut executor, recorder) = executor(set_reply);

        let params = json!({"desiredCapabilities": {"browserName": "firefox"}});
        executor.execute("newSession", &params).await.unwrap();

        let calls = recorder.lock().calls.clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].session_id, None);
        assert_eq!(calls[0].command, "newSession");
        assert_eq!(
            serde_json::from_str::<Value>(&calls[0].params).unwrap(),
            params
        );
    }

    #[tokio::test]
    async fn test_execute_attaches_session_and_adapts() {
        let (mut executor, recorder) = executor(set_reply);
        executor.bind_session(session("abc123")).unwrap();

        let result = executor
            .execute("findElements", &json!({"using": "css selector", "value": "a"}))
            .await
            .unwrap();
        assert_eq!(result.value, json!(["a", "b"]));

        let calls = recorder.lock().calls.clone();
        assert_eq!(calls[0].session_id.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_failure_message_is_exact() {
        let (mut executor, _recorder) = executor(boom_reply);
        executor.bind_session(session("abc123")).unwrap();

        let err = executor
            .execute("get", &json!({"url": "https://example.com"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(err.is_remote_failure());
    }

    #[tokio::test]
    async fn test_session_id_is_immutable() {
        let (mut executor, _recorder) = executor(set_reply);
        executor.bind_session(session("abc123")).unwrap();

        executor.bind_session(session("abc123")).unwrap();
        let err = executor.bind_session(session("other")).unwrap_err();
        assert!(matches!(err, Error::SessionAlreadyBound { .. }));
        assert_eq!(executor.session_id().map(SessionId::as_str), Some("abc123"));
        assert_eq!(executor.session(), &SessionState::Bound(session("abc123")));
    }

    #[tokio::test]
    async fn test_release_closes_owned_once() {
        let (mut executor, recorder) = executor(set_reply);

        executor.quit().await.unwrap();
        executor.quit().await.unwrap();
        assert_eq!(recorder.lock().closes, 1);
        assert!(matches!(
            executor.execute("status", &json!({})).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_shared_closed_by_last_owner() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let shared = share_service(Box::new(FakeService {
            recorder: Arc::clone(&recorder),
            reply: set_reply,
        }));

        let mut first = RpcCommandExecutor::shared(Arc::clone(&shared));
        let mut second = RpcCommandExecutor::shared(shared);

        first.release().await.unwrap();
        assert_eq!(recorder.lock().closes, 0);
        drop(first);

        second.release().await.unwrap();
        assert_eq!(recorder.lock().closes, 1);
    }

    #[tokio::test]
    async fn test_shared_closed_when_all_release_before_drop() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let shared = share_service(Box::new(FakeService {
            recorder: Arc::clone(&recorder),
            reply: set_reply,
        }));

        let mut first = RpcCommandExecutor::shared(Arc::clone(&shared));
        let mut second = RpcCommandExecutor::shared(shared);

        first.release().await.unwrap();
        second.release().await.unwrap();
        first.release().await.unwrap();

        assert_eq!(recorder.lock().closes, 1);
        assert!(first.is_released() && second.is_released());
    }

    #[tokio::test]
    async fn test_shared_left_open_while_caller_holds_it() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let shared = share_service(Box::new(FakeService {
            recorder: Arc::clone(&recorder),
            reply: set_reply,
        }));

        let mut executor = RpcCommandExecutor::shared(Arc::clone(&shared));
        executor.release().await.unwrap();

        assert_eq!(recorder.lock().closes, 0);
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[tokio::test]
    async fn test_all_arms_adapter() {
        fn title_reply(_command: &str) -> Result<Response> {
            Ok(Response {
                value: Some(ResponseValue::String("Example".into())),
                ..Response::default()
            })
        }

        let (executor, _recorder) = executor(title_reply);
        let mut executor = executor.with_adapter(ResponseAdapter::AllArms);
        executor.bind_session(session("abc123")).unwrap();

        let result = executor.execute("getTitle", &json!({})).await.unwrap();
        assert_eq!(result.value, json!("Example"));
    }
}
