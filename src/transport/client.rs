//! RPC client over an unframed binary-protocol stream.
//!
//! [`RpcClient`] writes one call, flushes, and reads exactly one reply
//! before the next call may start. Because every method takes `&mut self`,
//! overlapping calls on one connection are impossible by construction.
//!
//! # Failure Handling
//!
//! | Failure | Connection afterwards |
//! |---------|-----------------------|
//! | Declared remote failure | Usable |
//! | `EXCEPTION` reply | Usable |
//! | IO error, timeout, malformed reply | Poisoned |
//! | Reply name or seqid mismatch | Poisoned |
//!
//! A poisoned client fails every further call with
//! [`Error::ConnectionPoisoned`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    ActiveDriversResult, ApplicationErrorKind, ApplicationException, CheckLayoutArgs,
    CheckLayoutResult, ExecuteArgs, ExecuteResult, GenerateReportArgs, InitializeArgs,
    MessageReader, MessageType, MessageWriter, NoArgs, Response, ServiceResult, ThriftStruct,
    VoidResult, method,
};

use super::endpoint::{RetryPolicy, RpcOptions, ServiceEndpoint};
use super::remote::RemoteService;

// ============================================================================
// RpcClient
// ============================================================================

/// Client for the remote WebDriver service.
///
/// Generic over the byte stream so tests can run it over an in-memory pipe.
#[derive(Debug)]
pub struct RpcClient<S = TcpStream> {
    stream: BufStream<S>,
    options: RpcOptions,
    seqid: i32,
    poisoned: bool,
    closed: bool,
}

impl RpcClient<TcpStream> {
    /// Connects to the service.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the connect timeout elapses
    /// - [`Error::Connection`] if the connection is refused
    pub async fn connect(endpoint: &ServiceEndpoint, options: RpcOptions) -> Result<Self> {
        endpoint.validate()?;

        let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        let stream = timeout(options.connect_timeout, connect)
            .await
            .map_err(|_| Error::connection_timeout(duration_ms(options.connect_timeout)))?
            .map_err(|e| Error::connection(format!("{endpoint}: {e}")))?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }

        debug!(%endpoint, "Connected to service");
        Ok(Self::from_stream(stream, options))
    }

    /// Connects to a service that may still be starting.
    ///
    /// Retries with exponential backoff per `policy`.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn connect_with_retry(
        endpoint: &ServiceEndpoint,
        options: RpcOptions,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match Self::connect(endpoint, options).await {
                Ok(client) => return Ok(client),
                Err(e) if attempt < attempts && !matches!(e, Error::Config { .. }) => {
                    let delay = policy.delay_after(attempt);
                    debug!(
                        %endpoint,
                        attempt,
                        delay_ms = duration_ms(delay),
                        error = %e,
                        "Service not reachable yet, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S> RpcClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already connected stream.
    #[must_use]
    pub fn from_stream(stream: S, options: RpcOptions) -> Self {
        Self {
            stream: BufStream::new(stream),
            options,
            seqid: 0,
            poisoned: false,
            closed: false,
        }
    }

    /// Returns the connection options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RpcOptions {
        &self.options
    }

    /// Returns `true` if a failed call left the connection unusable.
    #[inline]
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns `true` once the connection was closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Performs one call and decodes its result.
    async fn call<A, R>(&mut self, name: &'static str, args: &A) -> Result<R::Output>
    where
        A: ThriftStruct + Sync,
        R: ServiceResult + Send,
    {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if self.poisoned {
            return Err(Error::ConnectionPoisoned);
        }

        self.seqid = self.seqid.wrapping_add(1);
        let seqid = self.seqid;
        let request = MessageWriter::message(name, MessageType::Call, seqid, args);
        trace!(method = name, seqid, bytes = request.len(), "Sending call");

        let outcome = match self.options.call_timeout {
            Some(limit) => match timeout(limit, self.exchange::<R>(name, seqid, &request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::call_timeout(name, duration_ms(limit))),
            },
            None => self.exchange::<R>(name, seqid, &request).await,
        };

        match outcome {
            Ok(result) => {
                trace!(method = name, seqid, "Reply received");
                result.into_output(name)
            }
            Err(e) => {
                if poisons_connection(&e) {
                    debug!(method = name, seqid, error = %e, "Call failed, connection poisoned");
                    self.poisoned = true;
                }
                Err(e)
            }
        }
    }

    /// Writes the request and reads the matching reply.
    async fn exchange<R: ThriftStruct>(
        &mut self,
        name: &'static str,
        seqid: i32,
        request: &[u8],
    ) -> Result<R> {
        self.stream.write_all(request).await?;
        self.stream.flush().await?;

        let mut reader =
            MessageReader::with_max_message_size(&mut self.stream, self.options.max_message_size);
        let header = reader.read_message_begin().await?;

        match header.kind {
            MessageType::Reply => {}
            MessageType::Exception => {
                let exception: ApplicationException = reader.read_typed().await?;
                return Err(exception.into_error(name));
            }
            other => {
                return Err(Error::application(
                    name,
                    ApplicationErrorKind::InvalidMessageType,
                    format!("{name} failed: unexpected {other} message"),
                ));
            }
        }

        // Read the whole body before validating so a mismatch is reported
        // against a fully consumed message.
        let result: R = reader.read_typed().await?;

        if header.name != name {
            return Err(Error::application(
                name,
                ApplicationErrorKind::WrongMethodName,
                format!("{name} failed: wrong method name '{}'", header.name),
            ));
        }
        if header.seqid != seqid {
            return Err(Error::application(
                name,
                ApplicationErrorKind::BadSequenceId,
                format!(
                    "{name} failed: out of sequence response (expected {seqid}, got {})",
                    header.seqid
                ),
            ));
        }

        Ok(result)
    }

    /// Flushes and shuts down the write half.
    async fn shutdown_stream(&mut self) -> Result<()> {
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// RemoteService Implementation
// ============================================================================

#[async_trait]
impl<S> RemoteService for RpcClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn initialize(&mut self, remote_server_addr: &str) -> Result<()> {
        let args = InitializeArgs {
            remote_server_addr: Some(remote_server_addr.to_owned()),
        };
        self.call::<_, VoidResult>(method::INITIALIZE, &args).await
    }

    async fn execute(
        &mut self,
        session_id: Option<&str>,
        command: &str,
        params: &str,
    ) -> Result<Response> {
        let args = ExecuteArgs {
            session_id: session_id.map(str::to_owned),
            command: Some(command.to_owned()),
            params: Some(params.to_owned()),
        };
        self.call::<_, ExecuteResult>(method::EXECUTE, &args).await
    }

    async fn check_layout(
        &mut self,
        test_name: &str,
        webdriver_session_id: &str,
        specs: &str,
        included_tags: &[String],
        excluded_tags: &[String],
    ) -> Result<i32> {
        let args = CheckLayoutArgs {
            test_name: Some(test_name.to_owned()),
            webdriver_session_id: Some(webdriver_session_id.to_owned()),
            specs: Some(specs.to_owned()),
            included_tags: included_tags.to_vec(),
            excluded_tags: excluded_tags.to_vec(),
        };
        self.call::<_, CheckLayoutResult>(method::CHECK_LAYOUT, &args)
            .await
    }

    async fn generate_report(&mut self, report_folder_path: &str) -> Result<()> {
        let args = GenerateReportArgs {
            report_folder_path: Some(report_folder_path.to_owned()),
        };
        self.call::<_, VoidResult>(method::GENERATE_REPORT, &args)
            .await
    }

    async fn active_drivers(&mut self) -> Result<i32> {
        self.call::<_, ActiveDriversResult>(method::ACTIVE_DRIVERS, &NoArgs)
            .await
    }

    async fn shut_service(&mut self) -> Result<()> {
        match self
            .call::<_, VoidResult>(method::SHUT_SERVICE, &NoArgs)
            .await
        {
            // The service exits before it can reply.
            Err(e) if e.is_disconnect() => {
                debug!("Service closed the connection on shutdown");
                Ok(())
            }
            other => other,
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.shutdown_stream().await {
            Err(e) if e.is_disconnect() => Ok(()),
            other => other,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns `true` if the error leaves the stream at an unknown position.
fn poisons_connection(err: &Error) -> bool {
    match err {
        Error::Application { kind, .. } => matches!(
            kind,
            ApplicationErrorKind::InvalidMessageType
                | ApplicationErrorKind::WrongMethodName
                | ApplicationErrorKind::BadSequenceId
        ),
        _ => true,
    }
}

#[inline]
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
