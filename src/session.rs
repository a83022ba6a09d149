use std::time::Duration;

use strum_macros::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::control::{ControlChannel, DEFAULT_REPLY_TIMEOUT};
use crate::drain::{DEFAULT_CHUNK_SIZE, StreamDrain};
use crate::error::SessionError;
use crate::protocol::{CMD_IN, CMD_OUT, Command, IQ_IN, ReplyMeaning};
use crate::sink::{Sink, SinkTarget};
use crate::transport::BulkTransport;

/// Tunables for a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long to wait for each reply on the command pipe.
    pub reply_timeout: Duration,
    /// Size of one read from the I/Q pipe.
    pub chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Idle,
    QueryingState,
    Streaming,
    /// The drain loop stopped on cancellation. Skipped when it failed.
    Draining,
    Disabling,
    Closed,
}

/// Outcome of a session that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Reply to the initial IQ-output query, if one arrived.
    pub iq_output: Option<ReplyMeaning>,
    /// Whether a sink was opened and the drain loop ran.
    pub streamed: bool,
    pub bytes_received: u64,
}

/// Drives query, enable, drain and disable against one opened device.
pub struct Session<T> {
    transport: T,
    config: SessionConfig,
    lifecycle: Lifecycle,
    progress: Option<Box<dyn FnMut(u64)>>,
}

struct Lifecycle {
    current: SessionState,
    visited: Vec<SessionState>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            current: SessionState::Idle,
            visited: vec![SessionState::Idle],
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug!("Session state: {} -> {}", self.current, next);
        self.current = next;
        self.visited.push(next);
    }
}

impl<T: BulkTransport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            lifecycle: Lifecycle::new(),
            progress: None,
        }
    }

    /// Forwards the drain loop's running byte total to `progress`.
    pub fn on_progress(mut self, progress: impl FnMut(u64) + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.current
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[SessionState] {
        &self.lifecycle.visited
    }

    /// Runs the whole session and releases the pipes. The interface itself is
    /// released when the session is dropped.
    ///
    /// Without a `target` only the query is sent. With one, the disable command
    /// and pipe release run on every path, including when the sink cannot be
    /// opened or the drain loop fails; those two failures are returned after cleanup.
    pub async fn run(
        &mut self,
        target: Option<SinkTarget>,
        cancel: &CancellationToken,
    ) -> Result<SessionReport, SessionError> {
        let transport = &self.transport;
        let config = self.config;
        let lifecycle = &mut self.lifecycle;

        lifecycle.advance(SessionState::QueryingState);
        let mut control = ControlChannel::new(transport, config.reply_timeout);
        let iq_output = control.exchange(Command::QueryIqOutput).await;

        let Some(target) = target else {
            info!("No sink given, query only.");
            release(transport).await;
            lifecycle.advance(SessionState::Closed);
            return Ok(SessionReport {
                iq_output,
                streamed: false,
                bytes_received: 0,
            });
        };

        let (outcome, sink) = match target.open().await {
            Ok(mut sink) => {
                control.exchange(Command::EnableIqOutput).await;

                lifecycle.advance(SessionState::Streaming);
                let result = {
                    let mut drain = StreamDrain::new(transport, &mut sink, config.chunk_size);
                    if let Some(report) = self.progress.as_mut() {
                        drain = drain.on_progress(|total| report(total));
                    }
                    drain.run(cancel).await
                };
                if result.is_ok() {
                    lifecycle.advance(SessionState::Draining);
                }

                (result.map_err(SessionError::from), Some(sink))
            }
            Err(source) => {
                error!("Failed to open {}: {}", target, source);
                let err = SessionError::SinkOpen {
                    target: target.to_string(),
                    source,
                };
                (Err(err), None)
            }
        };

        lifecycle.advance(SessionState::Disabling);
        control.exchange(Command::DisableIqOutput).await;

        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                warn!("Closing {} failed: {}", target, e);
            }
        }
        release(transport).await;
        lifecycle.advance(SessionState::Closed);

        let bytes_received = outcome?;
        info!("Received {} bytes in total", bytes_received);
        Ok(SessionReport {
            iq_output,
            streamed: true,
            bytes_received,
        })
    }
}

async fn release<T: BulkTransport>(transport: &T) {
    for endpoint in [CMD_OUT, CMD_IN, IQ_IN] {
        if let Err(e) = transport.abort(endpoint).await {
            warn!("Abort of endpoint {:#04x} failed: {}", endpoint, e);
        }
    }
}
