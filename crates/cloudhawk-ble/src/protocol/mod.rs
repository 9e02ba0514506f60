//! CloudHawk wire protocol: frame encoding and decoding
//!
//! Every frame, inbound and outbound, starts with the `55AA` magic header.
//! Outbound command frames carry an opcode byte and are zero-padded to the
//! device's write length. Inbound notification frames come in three shapes,
//! distinguished by total length (the shape is re-derived on every decode,
//! never assumed):
//!
//! - **Simple** (3 bytes): header + status code.
//! - **Reply** (6-11 bytes): header + length byte + `80` marker + responding
//!   opcode + data + sum-mod-256 checksum.
//! - **Extended** (12+ bytes): header + status code + payload at fixed
//!   offsets; only the docked layout has a confirmed field mapping.
//!
//! This layer is pure and stateless; all I/O lives in `transport`.

mod command;
mod frame;

pub use command::{encode, encode_raw, Command};
pub use frame::{decode, DecodedFrame, ExtendedFrame, ReplyBody};

use thiserror::Error;

/// Magic header carried by every frame
pub const FRAME_HEADER: [u8; 2] = [0x55, 0xAA];

/// Marker byte identifying a command reply payload
pub const REPLY_MARKER: u8 = 0x80;

/// Fixed outbound write length; short commands are zero-padded up to this
pub const WRITE_FRAME_LEN: usize = 20;

/// Status codes carried by simple and extended frames
pub mod status_code {
    pub const IDLE: u8 = 0x03;
    pub const MOWING: u8 = 0x04;
    pub const CHARGING: u8 = 0x06;
    pub const FAULT: u8 = 0x07;
    pub const DOCKED: u8 = 0x08;
}

/// Command opcodes (recovered from the vendor app's command table)
pub mod opcode {
    // Control
    pub const START: u8 = 0x05;
    pub const DOCK: u8 = 0x06;
    pub const STOP: u8 = 0x29;
    pub const SPIRAL_CUT: u8 = 0x79;
    pub const EDGE_CUT: u8 = 0x7C;
    pub const START_ONCE: u8 = 0x7D;

    // Queries
    pub const GET_FIRMWARE: u8 = 0x01;
    pub const GET_SERIAL: u8 = 0x02;
    pub const GET_TRIMMING: u8 = 0x07;
    pub const GET_SIGNAL: u8 = 0x0B;
    pub const GET_FAULT_LOG: u8 = 0x15;
    pub const GET_RAIN_DELAY: u8 = 0x32;
    pub const GET_ULTRASONIC: u8 = 0x54;
    pub const GET_WORKING_HOURS: u8 = 0x7A;
    pub const GET_STATUS: u8 = 0x81;
    pub const GET_BATTERY: u8 = 0x83;
}

/// Codec errors.
///
/// Decode failures are recoverable by design: the caller logs the frame
/// and drops it, the connection stays up, and no partial state is applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Frame does not start with the `55AA` header
    #[error("malformed frame: missing 55AA header")]
    MalformedFrame,

    /// Frame length matches no known shape (or a reply frame failed its
    /// internal framing/checksum)
    #[error("unrecognized frame shape ({len} bytes)")]
    UnrecognizedFrameShape { len: usize },

    /// Opcode outside the known command table. The command-kind set is
    /// closed, so hitting this from the typed API is a defect, not a
    /// runtime condition.
    #[error("opcode 0x{opcode:02X} is not in the command table")]
    InvalidCommand { opcode: u8 },
}

/// Sum-mod-256 checksum used by reply frames
pub(crate) fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}
