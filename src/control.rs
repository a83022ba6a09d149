use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::protocol::{self, CMD_IN, CMD_OUT, Command, ReplyMeaning};
use crate::transport::BulkTransport;

/// Default bound on waiting for a reply on the command pipe.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest reply read in one transfer.
const REPLY_BUFFER_SIZE: usize = 1024;

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Command/reply exchange over the command pipe pair.
pub struct ControlChannel<'a, T> {
    transport: &'a T,
    reply_timeout: Duration,
    reply_buf: Vec<u8>,
}

impl<'a, T: BulkTransport> ControlChannel<'a, T> {
    pub fn new(transport: &'a T, reply_timeout: Duration) -> Self {
        Self {
            transport,
            reply_timeout,
            reply_buf: Vec::with_capacity(REPLY_BUFFER_SIZE),
        }
    }

    /// Frames `command` and writes it in a single transfer. No retries.
    pub async fn send(&mut self, command: &[u8]) -> Result<(), TransportError> {
        let frame = protocol::encode(command)?;
        debug!(bytes = hex::encode(&frame), "USB Write");

        let written = self.transport.write(CMD_OUT, &frame, Some(WRITE_TIMEOUT)).await?;
        if written != frame.len() {
            return Err(TransportError::ShortWrite {
                endpoint: CMD_OUT,
                written,
                expected: frame.len(),
            });
        }
        Ok(())
    }

    /// Reads one reply within the reply timeout.
    ///
    /// On failure the command-in pipe is aborted and the error returned; the read is not retried.
    pub async fn receive(&mut self) -> Result<ReplyMeaning, TransportError> {
        match self
            .transport
            .read(CMD_IN, &mut self.reply_buf, REPLY_BUFFER_SIZE, Some(self.reply_timeout))
            .await
        {
            Ok(count) => {
                let reply = &self.reply_buf[..count.min(self.reply_buf.len())];
                debug!(bytes = hex::encode(reply), "USB Read");
                Ok(protocol::interpret(reply))
            }
            Err(e) => {
                warn!("Reply read failed: {}", e);
                match self.transport.abort(CMD_IN).await {
                    Ok(()) => debug!("Aborted endpoint {:#04x}", CMD_IN),
                    Err(abort_err) => warn!("Abort of endpoint {:#04x} failed: {}", CMD_IN, abort_err),
                }
                Err(e)
            }
        }
    }

    /// Best-effort exchange: failures are logged and yield `None`.
    pub async fn exchange(&mut self, command: Command) -> Option<ReplyMeaning> {
        info!("Sending command: {}", command);
        if let Err(e) = self.send(command.bytes()).await {
            warn!("Sending {} failed: {}", command, e);
            return None;
        }
        match self.receive().await {
            Ok(reply) => {
                info!("Reply to {}: {}", command, reply);
                Some(reply)
            }
            Err(e) => {
                warn!("No reply to {}: {}", command, e);
                None
            }
        }
    }
}
