//! # Icom CI-V framing over the IC-7610 USB 3 port
//!
//! The radio's USB 3 port is an FTDI FT60x bridge exposing three bulk pipes:
//! a command pipe pair carrying CI-V frames and a high-speed pipe carrying the
//! raw I/Q sample stream.
//!
//! ## Frame layout
//!
//! ```text
//! fe fe 98 e0 | command bytes ... | fd | ff ff ...
//! preamble      payload             end  padding to a multiple of 4
//! ```
//!
//! Replies use the same framing with the addresses swapped. Only the bytes at
//! [`CMD_INDEX`], [`SUBCMD_INDEX`] and [`DATA_INDEX`] carry meaning for this
//! client, see [`interpret`].

use bytes::{BufMut, Bytes, BytesMut};
use num_enum::TryFromPrimitive;
use std::fmt;
use strum_macros::Display;

use crate::error::FrameError;

// --- Constants ---

/// FTDI vendor id.
pub const VID: u16 = 0x0403;
/// FT601 product id.
pub const PID: u16 = 0x601f;
/// Interface holding the FIFO pipes (interface 0 is the FT60x session pipe).
pub const DATA_INTERFACE: u8 = 1;

pub const CMD_OUT: u8 = 0x02;
pub const CMD_IN: u8 = 0x82;
pub const IQ_IN: u8 = 0x84;

pub const RADIO_ADDRESS: u8 = 0x98;
pub const CONTROLLER_ADDRESS: u8 = 0xe0;
pub const PREAMBLE: [u8; 4] = [0xfe, 0xfe, RADIO_ADDRESS, CONTROLLER_ADDRESS];
pub const TERMINATOR: u8 = 0xfd;
pub const PADDING: u8 = 0xff;

/// Frames on the command pipe must be a multiple of this many bytes.
pub const FRAME_ALIGNMENT: usize = 4;
pub const MAX_FRAME_LEN: usize = 4096;

/// SuperSpeed bulk max packet size. I/Q reads are sized in whole packets.
pub const MAX_PACKET_SIZE: usize = 1024;

pub const CMD_INDEX: usize = 4;
pub const SUBCMD_INDEX: usize = 5;
pub const DATA_INDEX: usize = 6;

pub const SUB_OVERFLOW: u8 = 0x0a;
pub const SUB_IQ_OUTPUT: u8 = 0x0b;
pub const SUB_TRANSMIT: u8 = 0x00;
pub const SUB_XFC: u8 = 0x02;

// --- Commands ---

/// CI-V command codes this client knows how to read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandCode {
    /// "Various settings", sub-commands 0x0a (OVF) and 0x0b (IQ output).
    Settings = 0x1a,
    /// Transceiver status, sub-commands 0x00 (TX) and 0x02 (XFC).
    TransceiverStatus = 0x1c,
    Ng = 0xfa,
    Ok = 0xfb,
}

/// The commands a streaming session sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Command {
    #[strum(to_string = "query IQ output")]
    QueryIqOutput,
    #[strum(to_string = "enable IQ output (main VFO)")]
    EnableIqOutput,
    #[strum(to_string = "disable IQ output")]
    DisableIqOutput,
}

impl Command {
    /// Payload bytes placed between preamble and terminator.
    pub const fn bytes(self) -> &'static [u8] {
        match self {
            Command::QueryIqOutput => &[0x1a, 0x0b],
            Command::EnableIqOutput => &[0x1a, 0x0b, 0x01],
            Command::DisableIqOutput => &[0x1a, 0x0b, 0x00],
        }
    }
}

/// Wraps a command payload into a wire frame.
///
/// The result starts with [`PREAMBLE`], carries `command` verbatim, then
/// [`TERMINATOR`] and as many [`PADDING`] bytes as needed to reach a multiple
/// of [`FRAME_ALIGNMENT`].
pub fn encode(command: &[u8]) -> Result<Bytes, FrameError> {
    let len = (PREAMBLE.len() + command.len() + 1).next_multiple_of(FRAME_ALIGNMENT);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::CommandTooLong {
            len: command.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = BytesMut::with_capacity(len);
    frame.extend_from_slice(&PREAMBLE);
    frame.extend_from_slice(command);
    frame.put_u8(TERMINATOR);
    frame.resize(len, PADDING);
    Ok(frame.freeze())
}

// --- Replies ---

/// What a reply frame from the radio means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyMeaning {
    Overflow(u8),
    StreamOutputFlag(u8),
    TransmitFlag(u8),
    XfcFlag(u8),
    NegativeAck,
    PositiveAck,
    /// Anything not in the table, including frames too short to hold the fields.
    Unrecognized(Bytes),
}

/// Decodes a reply frame. Never fails: unknown or truncated input maps to
/// [`ReplyMeaning::Unrecognized`].
pub fn interpret(reply: &[u8]) -> ReplyMeaning {
    let flag = |kind: fn(u8) -> ReplyMeaning| reply.get(DATA_INDEX).copied().map(kind);

    let meaning = match reply.get(CMD_INDEX).copied().map(CommandCode::try_from) {
        Some(Ok(CommandCode::Ok)) => Some(ReplyMeaning::PositiveAck),
        Some(Ok(CommandCode::Ng)) => Some(ReplyMeaning::NegativeAck),
        Some(Ok(CommandCode::Settings)) => match reply.get(SUBCMD_INDEX).copied() {
            Some(SUB_OVERFLOW) => flag(ReplyMeaning::Overflow),
            Some(SUB_IQ_OUTPUT) => flag(ReplyMeaning::StreamOutputFlag),
            _ => None,
        },
        Some(Ok(CommandCode::TransceiverStatus)) => match reply.get(SUBCMD_INDEX).copied() {
            Some(SUB_TRANSMIT) => flag(ReplyMeaning::TransmitFlag),
            Some(SUB_XFC) => flag(ReplyMeaning::XfcFlag),
            _ => None,
        },
        _ => None,
    };

    meaning.unwrap_or_else(|| ReplyMeaning::Unrecognized(Bytes::copy_from_slice(reply)))
}

impl fmt::Display for ReplyMeaning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyMeaning::Overflow(v) => write!(f, "OVF: {}", v),
            ReplyMeaning::StreamOutputFlag(v) => write!(f, "IQ data output: {}", v),
            ReplyMeaning::TransmitFlag(v) => write!(f, "TX: {}", v),
            ReplyMeaning::XfcFlag(v) => write!(f, "XFC: {}", v),
            ReplyMeaning::NegativeAck => write!(f, "NG"),
            ReplyMeaning::PositiveAck => write!(f, "OK"),
            ReplyMeaning::Unrecognized(bytes) => write!(f, "unrecognized ({})", hex::encode(bytes)),
        }
    }
}
