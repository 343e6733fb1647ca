//! The remote service seam.
//!
//! [`RemoteService`] declares every operation of the RPC service. The
//! driver and command executor depend on this trait rather than on the TCP
//! client, so a recording fake can stand in for the service.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::protocol::Response;

// ============================================================================
// RemoteService
// ============================================================================

/// Operations exposed by the RPC service.
///
/// Methods take `&mut self`: a connection carries at most one call at a
/// time, and the next call cannot start until the previous reply is read.
#[async_trait]
pub trait RemoteService: Send {
    /// Points the service at the remote WebDriver hub.
    async fn initialize(&mut self, remote_server_addr: &str) -> Result<()>;

    /// Executes one WebDriver command.
    ///
    /// `session_id` is `None` only for session creation.
    async fn execute(
        &mut self,
        session_id: Option<&str>,
        command: &str,
        params: &str,
    ) -> Result<Response>;

    /// Validates the page of a session against layout specs.
    async fn check_layout(
        &mut self,
        test_name: &str,
        webdriver_session_id: &str,
        specs: &str,
        included_tags: &[String],
        excluded_tags: &[String],
    ) -> Result<i32>;

    /// Writes the HTML report into a folder on the service host.
    async fn generate_report(&mut self, report_folder_path: &str) -> Result<()>;

    /// Returns the number of live WebDriver sessions held by the service.
    async fn active_drivers(&mut self) -> Result<i32>;

    /// Terminates the service.
    async fn shut_service(&mut self) -> Result<()>;

    /// Releases the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Shuts the service down when it holds no sessions.
    ///
    /// Returns `true` if the service was asked to shut down.
    async fn quit_service_if_inactive(&mut self) -> Result<bool> {
        let active = self.active_drivers().await?;
        if active > 0 {
            debug!(active, "Service still has active drivers, leaving it running");
            return Ok(false);
        }

        info!("Service is idle, shutting it down");
        self.shut_service().await?;
        Ok(true)
    }
}
