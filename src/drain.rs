use std::io;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::DrainError;
use crate::protocol::IQ_IN;
use crate::sink::Sink;
use crate::transport::BulkTransport;

/// One read from the I/Q pipe.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Moves the I/Q stream from the device to a sink until cancelled.
pub struct StreamDrain<'a, T, S> {
    transport: &'a T,
    sink: &'a mut S,
    chunk_size: usize,
    buf: Vec<u8>,
    progress: Option<Box<dyn FnMut(u64) + 'a>>,
}

impl<'a, T: BulkTransport, S: Sink> StreamDrain<'a, T, S> {
    pub fn new(transport: &'a T, sink: &'a mut S, chunk_size: usize) -> Self {
        Self {
            transport,
            sink,
            chunk_size,
            buf: Vec::with_capacity(chunk_size),
            progress: None,
        }
    }

    /// Calls `progress` with the running byte total after every chunk.
    pub fn on_progress(mut self, progress: impl FnMut(u64) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Runs the drain loop and returns the number of bytes forwarded.
    ///
    /// `cancel` is checked before each read; a read in flight
    /// always completes first. A failed read or a failed/short sink write ends
    /// the loop with an error; nothing from a failed read reaches the sink.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<u64, DrainError> {
        let mut total: u64 = 0;
        info!(chunk_size = self.chunk_size, "Draining I/Q stream");

        while !cancel.is_cancelled() {
            let count = self
                .transport
                .read(IQ_IN, &mut self.buf, self.chunk_size, None)
                .await
                .map_err(|e| {
                    error!("I/Q read failed: {}", e);
                    DrainError::TransportRead(e)
                })?;
            let chunk = &self.buf[..count.min(self.buf.len())];

            let written = self.sink.write(chunk).await.map_err(|e| {
                error!("Sink write failed: {}", e);
                DrainError::SinkWrite(e)
            })?;
            if written != chunk.len() {
                error!("Sink took {} of {} bytes", written, chunk.len());
                return Err(DrainError::SinkWrite(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("sink wrote {} of {} bytes", written, chunk.len()),
                )));
            }

            total += chunk.len() as u64;
            if let Some(progress) = self.progress.as_mut() {
                progress(total);
            }
        }

        info!(bytes = total, "I/Q drain stopped");
        Ok(total)
    }
}
