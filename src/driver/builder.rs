//! Builder pattern for driver configuration.
//!
//! Provides a fluent API for configuring and creating [`RemoteDriver`]
//! instances.
//!
//! # Connection Sources
//!
//! | Method | Connection |
//! |--------|------------|
//! | (default) | New TCP client to `endpoint`, retried while the service starts |
//! | [`DriverBuilder::remote_service`] | Given service, owned by the driver |
//! | [`DriverBuilder::shared_service`] | Given service, shared with other drivers |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::service::{ServiceConfig, ServiceSupervisor};
use crate::transport::{RemoteService, RetryPolicy, RpcClient, RpcOptions, ServiceEndpoint};

use super::adapter::ResponseAdapter;
use super::core::RemoteDriver;
use super::executor::{RpcCommandExecutor, SharedService};

// ============================================================================
// Constants
// ============================================================================

/// Default WebDriver hub URL.
pub const DEFAULT_REMOTE_URL: &str = "http://127.0.0.1:4444/wd/hub";

// ============================================================================
// Types
// ============================================================================

/// Where the driver's service connection comes from.
enum Connector {
    Connect,
    Owned(Box<dyn RemoteService>),
    Shared(SharedService),
}

// ============================================================================
// DriverBuilder
// ============================================================================

/// Builder for configuring a [`RemoteDriver`].
///
/// Use [`RemoteDriver::builder()`] to create a new builder.
pub struct DriverBuilder {
    /// WebDriver hub URL handed to the service.
    remote_url: String,
    /// Capabilities sent with `newSession`.
    capabilities: Map<String, Value>,
    /// Service address, when set explicitly.
    endpoint: Option<ServiceEndpoint>,
    /// Client timeouts and limits.
    rpc_options: RpcOptions,
    /// First-connection retry.
    retry: RetryPolicy,
    /// Sidecar auto-start settings.
    service: Option<ServiceConfig>,
    /// Response adaptation.
    adapter: ResponseAdapter,
    /// Connection source.
    connector: Connector,
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DriverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverBuilder")
            .field("remote_url", &self.remote_url)
            .field("capabilities", &self.capabilities)
            .field("endpoint", &self.endpoint)
            .field("service", &self.service)
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DriverBuilder Implementation
// ============================================================================

impl DriverBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            capabilities: Map::new(),
            endpoint: None,
            rpc_options: RpcOptions::default(),
            retry: RetryPolicy::default(),
            service: None,
            adapter: ResponseAdapter::default(),
            connector: Connector::Connect,
        }
    }

    /// Sets the WebDriver hub URL.
    #[inline]
    #[must_use]
    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = url.into();
        self
    }

    /// Replaces the desired capabilities.
    #[inline]
    #[must_use]
    pub fn desired_capabilities(mut self, capabilities: Map<String, Value>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Adds one desired capability.
    #[inline]
    #[must_use]
    pub fn capability(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.capabilities.insert(name.into(), value.into());
        self
    }

    /// Sets the service address.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: ServiceEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets client timeouts and limits.
    #[inline]
    #[must_use]
    pub fn rpc_options(mut self, options: RpcOptions) -> Self {
        self.rpc_options = options;
        self
    }

    /// Sets the first-connection retry policy.
    #[inline]
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Starts the sidecar with this configuration before connecting.
    ///
    /// Without an explicit [`Self::endpoint`], the driver connects to the
    /// configured port on localhost.
    #[inline]
    #[must_use]
    pub fn auto_start(mut self, config: ServiceConfig) -> Self {
        self.service = Some(config);
        self
    }

    /// Sets the response adapter.
    #[inline]
    #[must_use]
    pub fn response_adapter(mut self, adapter: ResponseAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    /// Uses an already connected service, owned by the driver.
    #[inline]
    #[must_use]
    pub fn remote_service(mut self, service: Box<dyn RemoteService>) -> Self {
        self.connector = Connector::Owned(service);
        self
    }

    /// Uses a service shared with other drivers.
    #[inline]
    #[must_use]
    pub fn shared_service(mut self, service: SharedService) -> Self {
        self.connector = Connector::Shared(service);
        self
    }

    /// Builds the driver: starts the sidecar if configured, connects, and
    /// runs the session handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] or [`Error::Config`] for bad settings
    /// - Transport errors if the service cannot be reached
    /// - [`Error::SessionNotCreated`] if the handshake yields no session
    pub async fn build(self) -> Result<RemoteDriver> {
        let remote_url = self.validate_remote_url()?;
        let endpoint = self.resolve_endpoint()?;

        let supervisor = match self.service {
            Some(config) => {
                config.validate()?;
                let supervisor = Arc::new(ServiceSupervisor::system(config));
                let outcome = supervisor.ensure_started().await;
                if !outcome.is_available() {
                    warn!(%endpoint, "Service auto-start failed, connecting anyway");
                }
                Some(supervisor)
            }
            None => None,
        };

        let executor = match self.connector {
            Connector::Connect => {
                let client =
                    RpcClient::connect_with_retry(&endpoint, self.rpc_options, self.retry).await?;
                RpcCommandExecutor::new(Box::new(client))
            }
            Connector::Owned(service) => RpcCommandExecutor::new(service),
            Connector::Shared(service) => RpcCommandExecutor::shared(service),
        }
        .with_adapter(self.adapter);

        debug!(%endpoint, remote_url = %remote_url, "Starting session");
        RemoteDriver::start_session(executor, remote_url, self.capabilities, supervisor).await
    }
}

// ============================================================================
// Validation
// ============================================================================

impl DriverBuilder {
    /// Parses the hub URL, accepting only HTTP(S).
    fn validate_remote_url(&self) -> Result<Url> {
        let url = Url::parse(&self.remote_url).map_err(|source| Error::InvalidUrl {
            url: self.remote_url.clone(),
            source,
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Remote URL must use http or https, got '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }

    /// Picks the explicit endpoint, else the auto-start port, else the default.
    fn resolve_endpoint(&self) -> Result<ServiceEndpoint> {
        let endpoint = match (&self.endpoint, &self.service) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(config)) => ServiceEndpoint::localhost(config.port),
            (None, None) => ServiceEndpoint::default(),
        };
        endpoint.validate()?;
        Ok(endpoint)
    }
}

// ============================================================================
// Tests
// ============================================================================
