// src/error.rs

use nusb::transfer::TransferError;
use std::io;
use thiserror::Error;

/// Errors raised while building a wire frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Command of {len} bytes does not fit in a {max}-byte frame")]
    CommandTooLong { len: usize, max: usize },
}

/// Errors reported by the USB transport or by the control channel on top of it.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No device #{index} with VID {vid:#06x} / PID {pid:#06x}. Is the radio connected?")]
    DeviceNotFound { vid: u16, pid: u16, index: usize },

    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("USB transfer error on endpoint {endpoint:#04x}: {source}")]
    Transfer {
        endpoint: u8,
        #[source]
        source: TransferError,
    },

    #[error("Timeout on endpoint {endpoint:#04x}")]
    Timeout { endpoint: u8 },

    #[error("Short write on endpoint {endpoint:#04x}: wrote {written} of {expected} bytes")]
    ShortWrite { endpoint: u8, written: usize, expected: usize },

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Terminal conditions of the data drain loop.
#[derive(Error, Debug)]
pub enum DrainError {
    #[error("Reading the data endpoint failed: {0}")]
    TransportRead(#[source] TransportError),

    #[error("Writing to the sink failed: {0}")]
    SinkWrite(#[source] io::Error),
}

/// Conditions that end a session early. Device cleanup has already run when one is returned.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to open sink {target}: {source}")]
    SinkOpen {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Drain(#[from] DrainError),
}
