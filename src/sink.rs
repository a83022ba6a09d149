use std::fmt;
use std::io;
use std::path::PathBuf;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;

/// Destination of the sample stream.
#[allow(async_fn_in_trait)]
pub trait Sink {
    /// Writes `chunk` and returns how many bytes were taken.
    async fn write(&mut self, chunk: &[u8]) -> io::Result<usize>;

    /// Flushes and closes the sink.
    async fn close(&mut self) -> io::Result<()>;
}

/// Where the samples should go, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    File(PathBuf),
    Tcp { host: String, port: u16 },
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkTarget::File(path) => write!(f, "{}", path.display()),
            SinkTarget::Tcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

impl SinkTarget {
    /// Creates (truncating) the file or connects the socket.
    pub async fn open(&self) -> io::Result<OutputSink> {
        match self {
            SinkTarget::File(path) => {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .await?;
                info!("Writing to {}", path.display());
                Ok(OutputSink::File(file))
            }
            SinkTarget::Tcp { host, port } => {
                info!("Connecting to {}:{}", host, port);
                // Tries each resolved address in turn, IPv4 or IPv6.
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                if let Ok(peer) = stream.peer_addr() {
                    info!("Connected to {}", peer);
                }
                Ok(OutputSink::Tcp(stream))
            }
        }
    }
}

/// An opened file or TCP sink.
#[derive(Debug)]
pub enum OutputSink {
    File(File),
    Tcp(TcpStream),
}

impl Sink for OutputSink {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::File(file) => file.write_all(chunk).await?,
            OutputSink::Tcp(stream) => stream.write_all(chunk).await?,
        }
        Ok(chunk.len())
    }

    async fn close(&mut self) -> io::Result<()> {
        match self {
            OutputSink::File(file) => file.flush().await,
            OutputSink::Tcp(stream) => {
                stream.flush().await?;
                stream.shutdown().await
            }
        }
    }
}
