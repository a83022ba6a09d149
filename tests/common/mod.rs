//! Common test utilities: a scripted in-memory transport and recording sinks.

// Not every test file uses every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ic7610_rs::protocol::{CMD_IN, IQ_IN};
use ic7610_rs::{BulkTransport, Sink, TransportError};
use nusb::transfer::TransferError;
use tokio_util::sync::CancellationToken;

/// Reply to the IQ-output query saying the stream is off.
pub const IQ_OFF_REPLY: &str = "fefee0981a0b00fdffffffff";
/// Plain acknowledgement.
pub const OK_REPLY: &str = "fefee098fbfdffff";

#[derive(Default)]
struct State {
    writes: Vec<(u8, Vec<u8>)>,
    reads: Vec<(u8, usize, Option<Duration>)>,
    aborts: Vec<u8>,
    replies: VecDeque<Option<Vec<u8>>>,
    chunks: VecDeque<Option<Vec<u8>>>,
    short_writes: bool,
    cancel_after_last_chunk: Option<CancellationToken>,
}

/// Scripted device. Clones share state so a test can inspect it after handing one over.
///
/// An empty reply queue behaves like a reply timeout; an empty chunk queue like a
/// disconnected device.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, hex_data: &str) -> Self {
        let bytes = hex::decode(hex_data).expect("Failed to decode hex");
        self.state.lock().unwrap().replies.push_back(Some(bytes));
        self
    }

    pub fn with_failed_reply(self) -> Self {
        self.state.lock().unwrap().replies.push_back(None);
        self
    }

    pub fn with_chunk(self, chunk: Vec<u8>) -> Self {
        self.state.lock().unwrap().chunks.push_back(Some(chunk));
        self
    }

    pub fn with_failed_read(self) -> Self {
        self.state.lock().unwrap().chunks.push_back(None);
        self
    }

    /// Cancels `token` as the last scripted chunk is handed out.
    pub fn cancel_after_last_chunk(self, token: &CancellationToken) -> Self {
        self.state.lock().unwrap().cancel_after_last_chunk = Some(token.clone());
        self
    }

    /// Makes every write report one byte less than submitted.
    pub fn with_short_writes(self) -> Self {
        self.state.lock().unwrap().short_writes = true;
        self
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn reads(&self) -> Vec<(u8, usize, Option<Duration>)> {
        self.state.lock().unwrap().reads.clone()
    }

    pub fn reads_on(&self, endpoint: u8) -> usize {
        self.reads().iter().filter(|(ep, _, _)| *ep == endpoint).count()
    }

    pub fn aborts(&self) -> Vec<u8> {
        self.state.lock().unwrap().aborts.clone()
    }
}

impl BulkTransport for MockTransport {
    async fn write(&self, endpoint: u8, data: &[u8], _timeout: Option<Duration>) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push((endpoint, data.to_vec()));
        if state.short_writes {
            Ok(data.len().saturating_sub(1))
        } else {
            Ok(data.len())
        }
    }

    async fn read(
        &self,
        endpoint: u8,
        buf: &mut Vec<u8>,
        max_len: usize,
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.reads.push((endpoint, max_len, timeout));

        let next = match endpoint {
            CMD_IN => state.replies.pop_front().flatten(),
            IQ_IN => {
                let next = state.chunks.pop_front().flatten();
                if next.is_some() && state.chunks.is_empty() {
                    if let Some(token) = &state.cancel_after_last_chunk {
                        token.cancel();
                    }
                }
                next
            }
            _ => None,
        };

        match next {
            Some(data) => {
                buf.clear();
                buf.extend_from_slice(&data[..data.len().min(max_len)]);
                Ok(buf.len())
            }
            None if endpoint == CMD_IN => Err(TransportError::Timeout { endpoint }),
            None => Err(TransportError::Transfer {
                endpoint,
                source: TransferError::Disconnected,
            }),
        }
    }

    async fn abort(&self, endpoint: u8) -> Result<(), TransportError> {
        self.state.lock().unwrap().aborts.push(endpoint);
        Ok(())
    }
}

/// How a [`RecordingSink`] treats its `n`-th write (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBehavior {
    Accept,
    ShortOnWrite(usize),
    FailOnWrite(usize),
}

/// Keeps every chunk it is given, with its boundaries.
#[derive(Debug)]
pub struct RecordingSink {
    pub chunks: Vec<Vec<u8>>,
    pub closed: bool,
    behavior: SinkBehavior,
}

impl RecordingSink {
    pub fn new(behavior: SinkBehavior) -> Self {
        Self {
            chunks: Vec::new(),
            closed: false,
            behavior,
        }
    }
}

impl Sink for RecordingSink {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
        let n = self.chunks.len();
        match self.behavior {
            SinkBehavior::FailOnWrite(k) if k == n => Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink gone")),
            SinkBehavior::ShortOnWrite(k) if k == n => {
                let taken = chunk.len() / 2;
                self.chunks.push(chunk[..taken].to_vec());
                Ok(taken)
            }
            _ => {
                self.chunks.push(chunk.to_vec());
                Ok(chunk.len())
            }
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// A chunk of `len` bytes all set to `fill`.
pub fn chunk(len: usize, fill: u8) -> Vec<u8> {
    vec![fill; len]
}

/// A per-test path in the system temp directory, removed if it already exists.
pub fn temp_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("ic7610-rs-{}-{}.iq", name, std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}
