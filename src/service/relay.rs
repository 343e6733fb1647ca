//! Output stream relay.
//!
//! Drains one output stream of a spawned process line by line into
//! `tracing`. Reading never waits on the log sink, so the child never
//! blocks on a full pipe. Bytes that are not UTF-8 are logged lossily;
//! only end of stream or an I/O error ends the relay.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ============================================================================
// StreamKind
// ============================================================================

/// Which output stream a relay drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Standard output, logged at `info`.
    Stdout,
    /// Standard error, logged at `warn`.
    Stderr,
}

impl StreamKind {
    /// Stream name used as the `stream` log field.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    /// Default listener identity for the stream.
    #[inline]
    #[must_use]
    pub const fn default_listener(self) -> &'static str {
        match self {
            Self::Stdout => "stdout listener",
            Self::Stderr => "stderr listener",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// StreamRelay
// ============================================================================

/// Background task forwarding process output lines to the log.
#[derive(Debug, Clone, Copy)]
pub struct StreamRelay;

impl StreamRelay {
    /// Spawns a relay task.
    ///
    /// The task ends at end of stream and yields the number of lines
    /// relayed.
    pub fn spawn<R>(kind: StreamKind, listener: impl Into<String>, reader: R) -> JoinHandle<u64>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let listener = listener.into();
        tokio::spawn(async move { Self::run(kind, &listener, reader).await })
    }

    /// Relays lines on the current task until end of stream.
    pub async fn run<R>(kind: StreamKind, listener: &str, reader: R) -> u64
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);
        let mut count = 0u64;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    count += 1;
                    let line = String::from_utf8_lossy(trim_line_end(&buf));
                    match kind {
                        StreamKind::Stdout => info!(stream = kind.name(), listener, line = %line),
                        StreamKind::Stderr => warn!(stream = kind.name(), listener, line = %line),
                    }
                }
                Err(e) => {
                    debug!(stream = kind.name(), listener, error = %e, "Relay stopped on read error");
                    break;
                }
            }
        }

        debug!(stream = kind.name(), listener, lines = count, "Relay finished");
        count
    }
}

/// Strips a trailing `\n` or `\r\n`.
fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

// ============================================================================
// Tests
// ============================================================================
