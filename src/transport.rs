use std::time::Duration;

use crate::error::TransportError;

/// Blocking-style access to the bulk pipes of an opened device.
///
/// A `timeout` of `None` waits for as long as the device takes.
#[allow(async_fn_in_trait)]
pub trait BulkTransport {
    /// Submits `data` as a single transfer and returns how many bytes the device accepted.
    async fn write(&self, endpoint: u8, data: &[u8], timeout: Option<Duration>) -> Result<usize, TransportError>;

    /// Reads one transfer of at most `max_len` bytes into `buf`, replacing its contents.
    ///
    /// `buf` is reused across calls to avoid reallocating; after a successful read it holds
    /// exactly the received bytes.
    async fn read(
        &self,
        endpoint: u8,
        buf: &mut Vec<u8>,
        max_len: usize,
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError>;

    /// Drops whatever is pending on `endpoint` and resets its state.
    async fn abort(&self, endpoint: u8) -> Result<(), TransportError>;
}
